use crate::detection::domain::landmark::LandmarkSet;
use crate::detection::domain::mesh_topology::MeshTopology;
use crate::shared::frame::Frame;

/// Colour and size of one kind of overlay mark. Colours are RGB.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawingSpec {
    pub color: [u8; 3],
    pub thickness: u32,
    pub circle_radius: u32,
}

impl DrawingSpec {
    pub const fn new(color: [u8; 3], thickness: u32, circle_radius: u32) -> Self {
        Self {
            color,
            thickness,
            circle_radius,
        }
    }

    /// Green dot drawn on every mesh vertex.
    pub const fn landmark() -> Self {
        Self::new([0, 255, 0], 1, 1)
    }

    /// Blue line drawn along every tessellation edge.
    pub const fn connection() -> Self {
        Self::new([0, 0, 255], 1, 1)
    }

    /// Filled magenta marker for positions reported back to the caller.
    pub const fn position() -> Self {
        Self::new([255, 0, 255], 1, 5)
    }
}

impl Default for DrawingSpec {
    fn default() -> Self {
        Self::landmark()
    }
}

/// Domain interface for drawing detection results onto a frame.
///
/// Implementations mutate the frame in place and never write outside it.
pub trait OverlayRenderer: Send {
    /// Filled circle of `spec.circle_radius` centred on pixel (x, y).
    fn draw_point(&self, frame: &mut Frame, x: i32, y: i32, spec: &DrawingSpec);

    /// Lines along each topology edge, then a dot on each vertex. Edges
    /// referencing a landmark outside the set or outside the unit square
    /// are skipped.
    fn draw_mesh(
        &self,
        frame: &mut Frame,
        landmarks: &LandmarkSet,
        topology: &MeshTopology,
        landmark_spec: &DrawingSpec,
        connection_spec: &DrawingSpec,
    );
}
