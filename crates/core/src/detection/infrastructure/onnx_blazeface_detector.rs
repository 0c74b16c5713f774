/// BlazeFace face detector using ONNX Runtime via `ort`.
///
/// Finds face boxes that seed the landmark regressor. The frame is
/// letterboxed into the square model input so faces keep their aspect ratio.
use std::path::Path;

use crate::detection::domain::face_box::{FaceBox, SquareRoi};
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::infrastructure::math::{nms, sigmoid};
use crate::detection::infrastructure::onnx_session::{
    create_session, input_geometry, sample_square, InputLayout,
};
use crate::shared::frame::Frame;

/// BlazeFace model input resolution.
const INPUT_SIZE: usize = 128;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

/// Values per anchor in the regressor output: box (4) + 6 keypoints (12).
const REGRESSOR_STRIDE: usize = 16;

/// Raw logits are clipped to this magnitude before the sigmoid.
const SCORE_CLIP: f32 = 100.0;

/// BlazeFace face detector backed by an ONNX Runtime session.
pub struct OnnxBlazefaceDetector {
    session: ort::session::Session,
    layout: InputLayout,
    input_size: usize,
    confidence: f64,
    max_faces: usize,
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceDetector {
    /// Load a BlazeFace ONNX model.
    pub fn new(
        model_path: &Path,
        confidence: f64,
        max_faces: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = create_session(model_path)?;
        let (layout, input_size) = input_geometry(&session, INPUT_SIZE);
        log::debug!(
            "BlazeFace input {input_size}x{input_size} ({layout:?}) from {}",
            model_path.display()
        );
        Ok(Self {
            session,
            layout,
            input_size,
            confidence,
            max_faces,
            anchors: generate_anchors(input_size),
        })
    }
}

impl FaceDetector for OnnxBlazefaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
        let letterbox = letterbox_roi(frame.width(), frame.height());
        let input_tensor = sample_square(
            frame,
            &letterbox,
            self.input_size,
            self.layout,
            (-1.0, 1.0),
        );

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        // BlazeFace outputs two tensors:
        // - regressors: [1, 896, 16] (box deltas + keypoints)
        // - classificators: [1, 896, 1] (confidence scores)
        // Exported models disagree on their order, so pick by size.
        if outputs.len() < 2 {
            return Err(
                format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into(),
            );
        }
        let first = outputs[0].try_extract_array::<f32>()?;
        let second = outputs[1].try_extract_array::<f32>()?;
        let (regressors, scores) = if first.len() >= second.len() {
            (first, second)
        } else {
            (second, first)
        };
        let reg_data: Vec<f32> = regressors.iter().copied().collect();
        let score_data: Vec<f32> = scores.iter().copied().collect();

        let candidates = decode_boxes(
            &reg_data,
            &score_data,
            &self.anchors,
            self.input_size,
            self.confidence,
            &letterbox,
        );
        let mut faces = nms(candidates, NMS_IOU_THRESH);
        faces.truncate(self.max_faces);
        Ok(faces)
    }
}

/// Square covering the whole frame, centred, so the shorter side is padded.
fn letterbox_roi(width: u32, height: u32) -> SquareRoi {
    SquareRoi {
        center_x: width as f64 / 2.0,
        center_y: height as f64 / 2.0,
        size: width.max(height) as f64,
    }
}

/// Turns raw regressor and score tensors into boxes in frame pixels.
///
/// Boxes are decoded in the unit square of the model input, then mapped
/// through the letterbox back onto the frame. Boxes are not clipped.
fn decode_boxes(
    reg_data: &[f32],
    score_data: &[f32],
    anchors: &[[f32; 2]],
    input_size: usize,
    confidence: f64,
    letterbox: &SquareRoi,
) -> Vec<FaceBox> {
    let (ox, oy) = letterbox.origin();
    let side = letterbox.size;
    let scale = input_size as f32;
    let mut boxes = Vec::new();

    for (i, (&raw_score, anchor)) in score_data.iter().zip(anchors).enumerate() {
        let score = sigmoid(raw_score.clamp(-SCORE_CLIP, SCORE_CLIP)) as f64;
        if score < confidence {
            continue;
        }
        let offset = i * REGRESSOR_STRIDE;
        if offset + 4 > reg_data.len() {
            break;
        }

        let cx = anchor[0] + reg_data[offset] / scale;
        let cy = anchor[1] + reg_data[offset + 1] / scale;
        let w = reg_data[offset + 2] / scale;
        let h = reg_data[offset + 3] / scale;
        if w <= 0.0 || h <= 0.0 {
            continue;
        }

        boxes.push(FaceBox {
            x1: ox + (cx - w / 2.0) as f64 * side,
            y1: oy + (cy - h / 2.0) as f64 * side,
            x2: ox + (cx + w / 2.0) as f64 * side,
            y2: oy + (cy + h / 2.0) as f64 * side,
            score,
        });
    }

    boxes
}

/// Generate BlazeFace anchors for the short-range model.
///
/// The short-range model uses two feature map sizes: 16×16 and 8×8,
/// with 2 and 6 anchors per cell respectively.
fn generate_anchors(input_size: usize) -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)]; // (stride, anchors_per_cell)
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = input_size / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }

    anchors
}
