use std::path::PathBuf;

/// Which device or file a frame source reads from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    Camera(u32),
    File(PathBuf),
}

impl SourceSpec {
    /// A video path, when given, takes precedence over the camera index.
    pub fn from_options(camera_index: u32, video_path: Option<PathBuf>) -> Self {
        match video_path {
            Some(path) => SourceSpec::File(path),
            None => SourceSpec::Camera(camera_index),
        }
    }
}

impl std::fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSpec::Camera(index) => write!(f, "camera {index}"),
            SourceSpec::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Properties of an opened source, as reported by the decoder.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceMetadata {
    pub width: u32,
    pub height: u32,
    /// 0.0 when the container does not declare a rate (live devices often don't).
    pub fps: f64,
    /// 0 for unbounded sources such as cameras.
    pub total_frames: usize,
    pub codec: String,
    pub source: SourceSpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_path_overrides_camera() {
        let spec = SourceSpec::from_options(2, Some(PathBuf::from("/tmp/face.mp4")));
        assert_eq!(spec, SourceSpec::File(PathBuf::from("/tmp/face.mp4")));
    }

    #[test]
    fn test_camera_when_no_video_path() {
        let spec = SourceSpec::from_options(2, None);
        assert_eq!(spec, SourceSpec::Camera(2));
    }

    #[test]
    fn test_display_names_source() {
        assert_eq!(SourceSpec::Camera(0).to_string(), "camera 0");
        assert_eq!(
            SourceSpec::File(PathBuf::from("clips/5.mp4")).to_string(),
            "clips/5.mp4"
        );
    }

    #[test]
    fn test_camera_metadata_is_unbounded() {
        let meta = SourceMetadata {
            width: 1920,
            height: 1080,
            fps: 0.0,
            total_frames: 0,
            codec: "rawvideo".to_string(),
            source: SourceSpec::Camera(0),
        };
        assert_eq!(meta.total_frames, 0);
        assert_eq!(meta.clone(), meta);
    }
}
