//! Normalized face landmarks and per-frame detection results.
//!
//! Coordinates are fractions of the frame they were detected on. They only
//! mean something when multiplied by that same frame's width and height.

/// One anatomical point, normalized to the frame: x and y in [0, 1] for
/// points inside the image, z on the same scale as x.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Pixel position by truncating `x * width` and `y * height`.
    ///
    /// No clamping: a coordinate of exactly 1.0 maps to `width`/`height`,
    /// one past the last pixel.
    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        (
            (self.x * width as f32) as i32,
            (self.y * height as f32) as i32,
        )
    }

    /// Pixel position for drawing, or `None` when the point lies outside
    /// the unit square. Results are always inside the frame.
    pub fn to_drawable_pixel(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        let inside = |v: f32| (0.0..=1.0).contains(&v);
        if !inside(self.x) || !inside(self.y) || width == 0 || height == 0 {
            return None;
        }
        let px = ((self.x * width as f32).floor() as u32).min(width - 1);
        let py = ((self.y * height as f32).floor() as u32).min(height - 1);
        Some((px, py))
    }
}

/// The ordered landmarks of one face. The index of a landmark identifies
/// the anatomical point it stands for.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct LandmarkSet {
    landmarks: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn get(&self, id: usize) -> Option<&Landmark> {
        self.landmarks.get(id)
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Landmark)> {
        self.landmarks.iter().enumerate()
    }

    /// Axis-aligned bounds `(min_x, min_y, max_x, max_y)` in normalized units.
    pub fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        let first = self.landmarks.first()?;
        let init = (first.x, first.y, first.x, first.y);
        Some(self.landmarks.iter().fold(init, |(x0, y0, x1, y1), lm| {
            (x0.min(lm.x), y0.min(lm.y), x1.max(lm.x), y1.max(lm.y))
        }))
    }
}

/// What the detector found on one frame.
///
/// Nothing carries over between frames: there is no face identity, only
/// an order within this result.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum DetectionResult {
    #[default]
    Empty,
    FaceSet(Vec<LandmarkSet>),
}

impl DetectionResult {
    /// Collapses an empty face list into `Empty` so "no faces" has one form.
    pub fn from_faces(faces: Vec<LandmarkSet>) -> Self {
        if faces.is_empty() {
            DetectionResult::Empty
        } else {
            DetectionResult::FaceSet(faces)
        }
    }

    pub fn faces(&self) -> &[LandmarkSet] {
        match self {
            DetectionResult::Empty => &[],
            DetectionResult::FaceSet(faces) => faces,
        }
    }

    pub fn face(&self, face_no: usize) -> Option<&LandmarkSet> {
        self.faces().get(face_no)
    }

    pub fn face_count(&self) -> usize {
        self.faces().len()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, DetectionResult::Empty)
    }
}

/// A landmark resolved to pixels of a specific frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelLandmark {
    pub id: usize,
    pub x: i32,
    pub y: i32,
}
