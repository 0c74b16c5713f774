use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use facemesh_core::pipeline::display_loop::{DisplayLoop, LoopSummary, PositionQuery};
use facemesh_core::pipeline::face_mesh_session::{FaceMeshSession, SessionError};
use facemesh_core::pipeline::pipeline_logger::PipelineLogger;

use super::channel_surface::{ChannelSurface, ScreenBounds, WorkerMessage};

/// Frames in flight between the worker and the window. Keeps the worker
/// at most this far ahead of what is on screen.
const FRAME_QUEUE_DEPTH: usize = 2;

/// The window's end of the worker channels.
#[derive(Clone)]
pub struct WorkerLink {
    pub messages: Receiver<WorkerMessage>,
    pub quit: Sender<()>,
    pub screen: Arc<ScreenBounds>,
}

/// Runs the display loop on its own thread, presenting through a
/// [`ChannelSurface`]. The loop's result is both sent to the window as
/// `WorkerMessage::Stopped` and returned from the join handle.
pub fn spawn(
    session: FaceMeshSession,
    query: PositionQuery,
    logger: Box<dyn PipelineLogger>,
    initial_screen: (u32, u32),
) -> (WorkerLink, JoinHandle<Result<LoopSummary, SessionError>>) {
    let (frame_tx, frame_rx) = crossbeam_channel::bounded::<WorkerMessage>(FRAME_QUEUE_DEPTH);
    let (quit_tx, quit_rx) = crossbeam_channel::unbounded::<()>();
    let screen = Arc::new(ScreenBounds::new(initial_screen.0, initial_screen.1));

    let surface = ChannelSurface::new(frame_tx.clone(), quit_rx, screen.clone());
    let handle = thread::spawn(move || {
        let result = DisplayLoop::new(session, Box::new(surface), logger, query).run();
        match &result {
            Ok(summary) => log::debug!("Display loop finished: {summary:?}"),
            Err(e) => log::error!("Display loop failed: {e}"),
        }
        let report = result.as_ref().map(|s| *s).map_err(|e| e.to_string());
        let _ = frame_tx.send(WorkerMessage::Stopped(report));
        result
    });

    (
        WorkerLink {
            messages: frame_rx,
            quit: quit_tx,
            screen,
        },
        handle,
    )
}
