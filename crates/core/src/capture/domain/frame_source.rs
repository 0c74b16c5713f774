use thiserror::Error;

use crate::shared::frame::Frame;
use crate::shared::source_metadata::{SourceMetadata, SourceSpec};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("cannot open {source_spec}: {reason}")]
    Unavailable {
        source_spec: SourceSpec,
        reason: String,
    },
    #[error("failed to decode frame: {0}")]
    Decode(String),
    #[error("frame source is not open")]
    NotOpened,
}

/// Produces frames from a camera or a video file, one per call.
///
/// Implementations own the device/file handle between `open` and
/// `release`. `read` signals end-of-stream with `Ok(None)`; callers treat
/// a read error the same way, so implementations never retry.
pub trait FrameSource: Send {
    fn open(&mut self, spec: &SourceSpec) -> Result<SourceMetadata, CaptureError>;

    /// Next frame in RGB24, or `None` once the camera disconnects or the
    /// file is exhausted.
    fn read(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Closes the underlying handle. Must be safe to call more than once.
    fn release(&mut self);
}
