use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use facemesh_core::display::domain::display_surface::{DisplayError, DisplaySurface};
use facemesh_core::pipeline::display_loop::LoopSummary;
use facemesh_core::shared::frame::Frame;

/// Messages from the display worker to the window.
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    Frame(DisplayFrame),
    Stopped(Result<LoopSummary, String>),
}

/// An annotated frame ready for the image widget.
#[derive(Debug, Clone)]
pub struct DisplayFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    pub fps: f64,
}

/// Window size shared between the window (writer) and the worker (reader).
#[derive(Debug)]
pub struct ScreenBounds {
    width: AtomicU32,
    height: AtomicU32,
}

impl ScreenBounds {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: AtomicU32::new(width),
            height: AtomicU32::new(height),
        }
    }

    pub fn get(&self) -> (u32, u32) {
        (
            self.width.load(Ordering::Relaxed),
            self.height.load(Ordering::Relaxed),
        )
    }

    /// Ignores zero sizes reported while the window is minimised.
    pub fn set(&self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.width.store(width, Ordering::Relaxed);
        self.height.store(height, Ordering::Relaxed);
    }
}

/// Display surface that forwards frames to the iced window over a channel.
///
/// Quit arrives on `quit`; a closed window drops the other end, which also
/// counts as quit.
pub struct ChannelSurface {
    frames: Sender<WorkerMessage>,
    quit: Receiver<()>,
    screen: std::sync::Arc<ScreenBounds>,
    closed: bool,
}

impl ChannelSurface {
    pub fn new(
        frames: Sender<WorkerMessage>,
        quit: Receiver<()>,
        screen: std::sync::Arc<ScreenBounds>,
    ) -> Self {
        Self {
            frames,
            quit,
            screen,
            closed: false,
        }
    }
}

impl DisplaySurface for ChannelSurface {
    fn screen_size(&self) -> (u32, u32) {
        self.screen.get()
    }

    fn show(&mut self, frame: &Frame, fps: f64) -> Result<(), DisplayError> {
        if self.closed {
            return Err(DisplayError::Closed);
        }
        let message = WorkerMessage::Frame(DisplayFrame {
            width: frame.width(),
            height: frame.height(),
            rgba: to_rgba(frame),
            fps,
        });
        if self.frames.send(message).is_err() {
            // Window already gone; the next poll reports quit.
            log::debug!("Window closed before frame {} was shown", frame.index());
            self.closed = true;
        }
        Ok(())
    }

    fn poll_quit(&mut self, wait: Duration) -> bool {
        if self.closed {
            return true;
        }
        match self.quit.recv_timeout(wait) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                self.closed = true;
                true
            }
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

fn to_rgba(frame: &Frame) -> Vec<u8> {
    let channels = frame.channels() as usize;
    let mut rgba = Vec::with_capacity(frame.width() as usize * frame.height() as usize * 4);
    for px in frame.data().chunks_exact(channels) {
        match channels {
            1 => rgba.extend_from_slice(&[px[0], px[0], px[0], 255]),
            _ => rgba.extend_from_slice(&[px[0], px[1], px[2], 255]),
        }
    }
    rgba
}
