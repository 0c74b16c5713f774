use thiserror::Error;

use crate::detection::domain::landmark::DetectionResult;
use crate::detection::domain::mesh_topology::MeshTopology;
use crate::shared::frame::Frame;

#[derive(Error, Debug, PartialEq)]
pub enum DetectorConfigError {
    #[error("max_num_faces must be at least 1")]
    NoFaces,
    #[error("{name} must be between 0.0 and 1.0, got {value}")]
    Confidence { name: &'static str, value: f64 },
}

/// Construction-time options for a face-mesh detector.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectorConfig {
    /// Treat every frame as unrelated: detect from scratch, no tracking.
    pub static_image_mode: bool,
    pub max_num_faces: usize,
    /// Minimum face-detector score to accept a new face.
    pub min_detection_confidence: f64,
    /// Minimum landmark presence score to keep tracking a face.
    pub min_tracking_confidence: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            static_image_mode: false,
            max_num_faces: 1,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), DetectorConfigError> {
        if self.max_num_faces == 0 {
            return Err(DetectorConfigError::NoFaces);
        }
        for (name, value) in [
            ("min_detection_confidence", self.min_detection_confidence),
            ("min_tracking_confidence", self.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(DetectorConfigError::Confidence { name, value });
            }
        }
        Ok(())
    }
}

/// Domain interface for the face-mesh collaborator.
///
/// Finding no face is not an error: implementations return
/// `DetectionResult::Empty`. Implementations may track faces across
/// frames, hence `&mut self`.
pub trait LandmarkDetector: Send {
    fn process(&mut self, frame: &Frame) -> Result<DetectionResult, Box<dyn std::error::Error>>;

    /// Edge table used to draw the mesh for this detector's landmark layout.
    fn topology(&self) -> &MeshTopology;
}
