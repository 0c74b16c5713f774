use crate::detection::domain::landmark::LandmarkSet;

/// A detected face as a pixel-space box `[x1, y1) x [y1, y2)` with its score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub score: f64,
}

impl FaceBox {
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn corners(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Square crop, in frame pixels, fed to the landmark regressor.
///
/// May extend past the frame edges; pixels outside the frame read as black.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SquareRoi {
    pub center_x: f64,
    pub center_y: f64,
    pub size: f64,
}

impl SquareRoi {
    /// Square around the box, with side `max(width, height) * scale`.
    pub fn around_box(face: &FaceBox, scale: f64) -> Self {
        Self {
            center_x: (face.x1 + face.x2) / 2.0,
            center_y: (face.y1 + face.y2) / 2.0,
            size: face.width().max(face.height()) * scale,
        }
    }

    /// Square around the previous frame's landmarks, used while tracking.
    pub fn around_landmarks(
        landmarks: &LandmarkSet,
        frame_width: u32,
        frame_height: u32,
        scale: f64,
    ) -> Option<Self> {
        let (x0, y0, x1, y1) = landmarks.bounds()?;
        let face = FaceBox {
            x1: x0 as f64 * frame_width as f64,
            y1: y0 as f64 * frame_height as f64,
            x2: x1 as f64 * frame_width as f64,
            y2: y1 as f64 * frame_height as f64,
            score: 1.0,
        };
        let roi = Self::around_box(&face, scale);
        (roi.size > 0.0).then_some(roi)
    }

    pub fn origin(&self) -> (f64, f64) {
        (
            self.center_x - self.size / 2.0,
            self.center_y - self.size / 2.0,
        )
    }

    pub fn corners(&self) -> [f64; 4] {
        let (x, y) = self.origin();
        [x, y, x + self.size, y + self.size]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::landmark::Landmark;
    use approx::assert_relative_eq;

    fn face(x1: f64, y1: f64, x2: f64, y2: f64) -> FaceBox {
        FaceBox {
            x1,
            y1,
            x2,
            y2,
            score: 0.9,
        }
    }

    #[test]
    fn test_dimensions() {
        let f = face(10.0, 20.0, 50.0, 100.0);
        assert_relative_eq!(f.width(), 40.0);
        assert_relative_eq!(f.height(), 80.0);
    }

    #[test]
    fn test_roi_around_box_uses_longer_side() {
        let roi = SquareRoi::around_box(&face(10.0, 20.0, 50.0, 100.0), 1.5);
        assert_relative_eq!(roi.center_x, 30.0);
        assert_relative_eq!(roi.center_y, 60.0);
        assert_relative_eq!(roi.size, 120.0);
        let [x1, y1, x2, y2] = roi.corners();
        assert_relative_eq!(x1, -30.0);
        assert_relative_eq!(y1, 0.0);
        assert_relative_eq!(x2, 90.0);
        assert_relative_eq!(y2, 120.0);
    }

    #[test]
    fn test_roi_around_landmarks_scales_to_pixels() {
        let set = LandmarkSet::new(vec![
            Landmark::new(0.25, 0.25, 0.0),
            Landmark::new(0.75, 0.5, 0.0),
        ]);
        let roi = SquareRoi::around_landmarks(&set, 200, 100, 1.0).unwrap();
        assert_relative_eq!(roi.center_x, 100.0);
        assert_relative_eq!(roi.center_y, 37.5);
        assert_relative_eq!(roi.size, 100.0);
    }

    #[test]
    fn test_roi_around_single_point_is_none() {
        let set = LandmarkSet::new(vec![Landmark::new(0.5, 0.5, 0.0)]);
        assert!(SquareRoi::around_landmarks(&set, 200, 100, 1.5).is_none());
    }

    #[test]
    fn test_roi_around_empty_set_is_none() {
        assert!(SquareRoi::around_landmarks(&LandmarkSet::default(), 200, 100, 1.5).is_none());
    }
}
