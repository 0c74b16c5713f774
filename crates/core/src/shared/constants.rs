pub const FACE_DETECTOR_MODEL_NAME: &str = "face_detection_short_range.onnx";
pub const LANDMARK_MODEL_NAME: &str = "face_landmark.onnx";

pub const MESH_TOPOLOGY_NAME: &str = "canonical_face_model.obj";
pub const MESH_TOPOLOGY_URL: &str = "https://raw.githubusercontent.com/google-ai-edge/mediapipe/master/mediapipe/modules/face_geometry/data/canonical_face_model.obj";

/// Resolution requested from cameras when they are opened.
pub const CAMERA_CAPTURE_WIDTH: u32 = 1920;
pub const CAMERA_CAPTURE_HEIGHT: u32 = 1080;

/// Bounded wait for quit input at the end of every loop iteration.
pub const QUIT_POLL_MS: u64 = 1;

/// Key that stops the display loop.
pub const QUIT_KEY: char = 'q';

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm", "m4v"];
