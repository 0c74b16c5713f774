use crate::detection::domain::face_box::FaceBox;
use crate::shared::frame::Frame;

/// Domain interface for the face-localisation stage that seeds landmark
/// regression with a region per face.
pub trait FaceDetector: Send {
    /// Faces above the detector's confidence threshold, highest score first.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>>;
}
