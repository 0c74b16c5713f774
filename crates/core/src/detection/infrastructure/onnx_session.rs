//! ONNX Runtime session setup and input preparation shared by the face
//! detector and the landmark regressor.

use std::path::Path;

use crate::detection::domain::face_box::SquareRoi;
use crate::shared::frame::Frame;

/// Return the preferred ONNX execution providers for the current platform.
///
/// Falls back to CPU if the platform-specific provider is unavailable.
pub fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

pub fn create_session(model_path: &Path) -> Result<ort::session::Session, Box<dyn std::error::Error>> {
    let session = ort::session::Session::builder()?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(model_path)?;
    Ok(session)
}

/// Memory layout of a square image input tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputLayout {
    /// `[1, 3, H, W]`
    Nchw,
    /// `[1, H, W, 3]`
    Nhwc,
}

/// Reads layout and side length from the model's first input.
///
/// Falls back to NHWC with `default_size` when the shape is dynamic or
/// unreadable.
pub fn input_geometry(session: &ort::session::Session, default_size: usize) -> (InputLayout, usize) {
    let shape: Option<Vec<i64>> = session.inputs().first().and_then(|input| {
        if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
            Some(shape.iter().copied().collect())
        } else {
            None
        }
    });
    shape
        .map(|s| geometry_from_shape(&s, default_size))
        .unwrap_or((InputLayout::Nhwc, default_size))
}

fn geometry_from_shape(shape: &[i64], default_size: usize) -> (InputLayout, usize) {
    if shape.len() != 4 {
        return (InputLayout::Nhwc, default_size);
    }
    let (layout, side) = if shape[1] == 3 {
        (InputLayout::Nchw, shape[2])
    } else {
        (InputLayout::Nhwc, shape[1])
    };
    let size = if side > 0 { side as usize } else { default_size };
    (layout, size)
}

/// Samples `roi` from the frame into a `size × size` RGB tensor with
/// nearest-neighbour lookup, mapping bytes linearly onto `range`.
/// Pixels outside the frame are treated as black.
pub fn sample_square(
    frame: &Frame,
    roi: &SquareRoi,
    size: usize,
    layout: InputLayout,
    range: (f32, f32),
) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let fw = frame.width() as i64;
    let fh = frame.height() as i64;
    let (ox, oy) = roi.origin();
    let step = roi.size / size as f64;
    let (lo, hi) = range;
    let scale = (hi - lo) / 255.0;

    let mut tensor = match layout {
        InputLayout::Nchw => ndarray::Array4::<f32>::zeros((1, 3, size, size)),
        InputLayout::Nhwc => ndarray::Array4::<f32>::zeros((1, size, size, 3)),
    };

    for y in 0..size {
        let sy = (oy + (y as f64 + 0.5) * step).floor() as i64;
        for x in 0..size {
            let sx = (ox + (x as f64 + 0.5) * step).floor() as i64;
            let inside = sx >= 0 && sy >= 0 && sx < fw && sy < fh;
            for c in 0..3 {
                let v = if inside {
                    src[[sy as usize, sx as usize, c]] as f32 * scale + lo
                } else {
                    lo
                };
                match layout {
                    InputLayout::Nchw => tensor[[0, c, y, x]] = v,
                    InputLayout::Nhwc => tensor[[0, y, x, c]] = v,
                }
            }
        }
    }

    tensor
}
