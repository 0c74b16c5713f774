use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("no display surface available: {0}")]
    Unavailable(String),
    #[error("display surface was closed")]
    Closed,
}

/// Domain interface for the window that presents annotated frames.
///
/// Owned by the display loop. `close` must tolerate repeated calls.
pub trait DisplaySurface: Send {
    /// Largest frame, in pixels, the surface can show without scaling.
    fn screen_size(&self) -> (u32, u32);

    /// Presents the frame with the current frame rate.
    fn show(&mut self, frame: &Frame, fps: f64) -> Result<(), DisplayError>;

    /// Waits at most `wait` for user input and reports whether quit was
    /// requested. Best effort: input arriving after the wait is seen on
    /// the next poll.
    fn poll_quit(&mut self, wait: std::time::Duration) -> bool;

    fn close(&mut self);
}
