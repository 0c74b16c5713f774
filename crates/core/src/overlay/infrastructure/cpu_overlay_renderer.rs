use crate::detection::domain::landmark::LandmarkSet;
use crate::detection::domain::mesh_topology::MeshTopology;
use crate::overlay::domain::overlay_renderer::{DrawingSpec, OverlayRenderer};
use crate::shared::frame::Frame;

/// Software rasteriser for landmark overlays.
///
/// Lines use Bresenham's algorithm; thick lines and dots are stamped with
/// filled discs. Every write goes through `Frame::put_pixel`, which drops
/// pixels outside the frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuOverlayRenderer;

impl CpuOverlayRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl OverlayRenderer for CpuOverlayRenderer {
    fn draw_point(&self, frame: &mut Frame, x: i32, y: i32, spec: &DrawingSpec) {
        fill_disc(frame, x as i64, y as i64, spec.circle_radius as i64, spec.color);
    }

    fn draw_mesh(
        &self,
        frame: &mut Frame,
        landmarks: &LandmarkSet,
        topology: &MeshTopology,
        landmark_spec: &DrawingSpec,
        connection_spec: &DrawingSpec,
    ) {
        let (fw, fh) = (frame.width(), frame.height());
        let pixels: Vec<Option<(u32, u32)>> = landmarks
            .landmarks()
            .iter()
            .map(|lm| lm.to_drawable_pixel(fw, fh))
            .collect();

        for &(a, b) in topology.edges() {
            let (Some(Some(start)), Some(Some(end))) = (pixels.get(a), pixels.get(b)) else {
                continue;
            };
            draw_line(frame, *start, *end, connection_spec);
        }

        for &(x, y) in pixels.iter().flatten() {
            fill_disc(
                frame,
                x as i64,
                y as i64,
                landmark_spec.circle_radius as i64,
                landmark_spec.color,
            );
        }
    }
}

fn draw_line(frame: &mut Frame, start: (u32, u32), end: (u32, u32), spec: &DrawingSpec) {
    let (mut x0, mut y0) = (start.0 as i64, start.1 as i64);
    let (x1, y1) = (end.0 as i64, end.1 as i64);
    let half = (spec.thickness.max(1) as i64 - 1) / 2;

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        fill_disc(frame, x0, y0, half, spec.color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn fill_disc(frame: &mut Frame, cx: i64, cy: i64, radius: i64, color: [u8; 3]) {
    let r2 = radius * radius;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= r2 {
                frame.put_pixel(cx + dx, cy + dy, color);
            }
        }
    }
}
