/// Two-stage face mesh using ONNX Runtime via `ort`.
///
/// A `FaceDetector` proposes face boxes, then the face-landmark regressor
/// turns a square crop around each face into 468 (or 478) 3D landmarks.
/// Outside static-image mode the previous frame's landmarks seed the next
/// crop, and the face detector only runs when a slot is free.
use std::path::Path;

use crate::detection::domain::face_box::{FaceBox, SquareRoi};
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::landmark::{DetectionResult, Landmark, LandmarkSet};
use crate::detection::domain::landmark_detector::{DetectorConfig, LandmarkDetector};
use crate::detection::domain::mesh_topology::MeshTopology;
use crate::detection::infrastructure::math::{bbox_iou, sigmoid};
use crate::detection::infrastructure::onnx_session::{
    create_session, input_geometry, sample_square, InputLayout,
};
use crate::shared::frame::Frame;

/// Fallback landmark model input resolution.
const DEFAULT_INPUT_SIZE: usize = 192;

/// Crop side relative to the face extent.
const ROI_SCALE: f64 = 1.5;

/// A new detection overlapping a tracked crop by more than this is the same face.
const TRACK_IOU_THRESH: f64 = 0.5;

/// Flattened landmark output sizes: 468 or 478 points × (x, y, z).
const LANDMARK_VALUE_COUNTS: [usize; 2] = [468 * 3, MAX_LANDMARKS * 3];

/// Landmarks per face including the iris refinement points.
const MAX_LANDMARKS: usize = 478;

pub struct OnnxFaceMeshDetector {
    face_detector: Box<dyn FaceDetector>,
    session: ort::session::Session,
    layout: InputLayout,
    input_size: usize,
    config: DetectorConfig,
    topology: MeshTopology,
    tracked: Vec<LandmarkSet>,
}

impl OnnxFaceMeshDetector {
    pub fn new(
        face_detector: Box<dyn FaceDetector>,
        landmark_model: &Path,
        config: DetectorConfig,
        topology: MeshTopology,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;
        if let Some(max) = topology.max_index() {
            if max >= MAX_LANDMARKS {
                log::warn!("Mesh topology references landmark {max}; those edges will never be drawn");
            }
        }
        let session = create_session(landmark_model)?;
        let (layout, input_size) = input_geometry(&session, DEFAULT_INPUT_SIZE);
        log::debug!(
            "Landmark model input {input_size}x{input_size} ({layout:?}) from {}",
            landmark_model.display()
        );
        Ok(Self {
            face_detector,
            session,
            layout,
            input_size,
            config,
            topology,
            tracked: Vec::new(),
        })
    }

    /// Runs the regressor on one crop. Returns the landmarks and the face
    /// presence probability.
    fn regress(
        &mut self,
        frame: &Frame,
        roi: &SquareRoi,
    ) -> Result<(LandmarkSet, f32), Box<dyn std::error::Error>> {
        let input_tensor = sample_square(frame, roi, self.input_size, self.layout, (0.0, 1.0));
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        let mut coords: Option<Vec<f32>> = None;
        let mut presence: Option<f32> = None;
        for i in 0..outputs.len() {
            let array = outputs[i].try_extract_array::<f32>()?;
            let n = array.len();
            if coords.is_none() && LANDMARK_VALUE_COUNTS.contains(&n) {
                coords = Some(array.iter().copied().collect());
            } else if presence.is_none() && n == 1 {
                presence = array.iter().next().map(|&logit| sigmoid(logit));
            }
        }

        let coords = coords.ok_or("Landmark model produced no 468/478-point output")?;
        let landmarks = decode_landmarks(
            &coords,
            roi,
            self.input_size,
            frame.width(),
            frame.height(),
        );
        // Models without a presence head are trusted.
        Ok((landmarks, presence.unwrap_or(1.0)))
    }
}

impl LandmarkDetector for OnnxFaceMeshDetector {
    fn process(&mut self, frame: &Frame) -> Result<DetectionResult, Box<dyn std::error::Error>> {
        let fw = frame.width();
        let fh = frame.height();
        let max_faces = self.config.max_num_faces;

        if self.config.static_image_mode {
            self.tracked.clear();
        }

        let mut rois: Vec<SquareRoi> = self
            .tracked
            .iter()
            .filter_map(|face| SquareRoi::around_landmarks(face, fw, fh, ROI_SCALE))
            .take(max_faces)
            .collect();
        let tracked_count = rois.len();

        if rois.len() < max_faces {
            let boxes = self.face_detector.detect(frame)?;
            merge_detections(&mut rois, &boxes, max_faces);
        }

        // Tracking confidence does not apply to single images.
        let threshold = if self.config.static_image_mode {
            0.0
        } else {
            self.config.min_tracking_confidence as f32
        };

        let mut faces: Vec<LandmarkSet> = Vec::with_capacity(rois.len());
        for (i, roi) in rois.iter().enumerate() {
            let (landmarks, presence) = self.regress(frame, roi)?;
            if presence < threshold {
                if i < tracked_count {
                    log::debug!("Lost track of face {i} (presence {presence:.2})");
                }
                continue;
            }
            if duplicates_existing(&faces, &landmarks) {
                continue;
            }
            faces.push(landmarks);
        }

        if !self.config.static_image_mode {
            self.tracked = faces.clone();
        }
        Ok(DetectionResult::from_faces(faces))
    }

    fn topology(&self) -> &MeshTopology {
        &self.topology
    }
}

/// Appends crops for detected boxes that do not overlap an existing crop,
/// until `max_faces` crops exist. Boxes are taken in the order given.
fn merge_detections(rois: &mut Vec<SquareRoi>, boxes: &[FaceBox], max_faces: usize) {
    for face in boxes {
        if rois.len() >= max_faces {
            break;
        }
        let candidate = SquareRoi::around_box(face, ROI_SCALE);
        let overlaps = rois
            .iter()
            .any(|roi| bbox_iou(&roi.corners(), &candidate.corners()) > TRACK_IOU_THRESH);
        if !overlaps {
            rois.push(candidate);
        }
    }
}

/// Two tracks that drifted onto the same face collapse into the first one.
fn duplicates_existing(faces: &[LandmarkSet], candidate: &LandmarkSet) -> bool {
    let Some(b) = normalized_corners(candidate) else {
        return false;
    };
    faces
        .iter()
        .filter_map(normalized_corners)
        .any(|a| bbox_iou(&a, &b) > TRACK_IOU_THRESH)
}

fn normalized_corners(set: &LandmarkSet) -> Option<[f64; 4]> {
    let (x0, y0, x1, y1) = set.bounds()?;
    Some([x0 as f64, y0 as f64, x1 as f64, y1 as f64])
}

/// Maps crop-pixel landmarks `(x, y, z)` back onto the frame, normalised
/// by the frame's width and height. `z` shares the x scale.
fn decode_landmarks(
    coords: &[f32],
    roi: &SquareRoi,
    input_size: usize,
    frame_width: u32,
    frame_height: u32,
) -> LandmarkSet {
    let (ox, oy) = roi.origin();
    let scale = roi.size / input_size as f64;
    let fw = frame_width as f64;
    let fh = frame_height as f64;

    let landmarks = coords
        .chunks_exact(3)
        .map(|p| {
            let x = (ox + p[0] as f64 * scale) / fw;
            let y = (oy + p[1] as f64 * scale) / fh;
            let z = p[2] as f64 * scale / fw;
            Landmark::new(x as f32, y as f32, z as f32)
        })
        .collect();
    LandmarkSet::new(landmarks)
}
