use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::display::domain::display_surface::DisplaySurface;
use crate::pipeline::face_mesh_session::{FaceMeshSession, SessionError};
use crate::pipeline::fps_meter::FpsMeter;
use crate::pipeline::pipeline_logger::{PipelineLogger, STAGE_DISPLAY};
use crate::shared::constants::QUIT_POLL_MS;

/// Why the loop left `Running`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The source ran out of frames or a read failed.
    EndOfStream,
    /// The user asked to quit.
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped(StopReason),
}

/// Which landmarks to report back on each frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PositionQuery {
    pub face_no: usize,
    /// Draw a marker at every reported landmark.
    pub draw: bool,
    /// `None` reports every landmark.
    pub landmark_ids: Option<HashSet<usize>>,
    /// Log the reported positions at info level.
    pub print: bool,
}

impl Default for PositionQuery {
    fn default() -> Self {
        Self {
            face_no: 0,
            draw: true,
            landmark_ids: Some(HashSet::from([0])),
            print: false,
        }
    }
}

/// How a finished loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopSummary {
    pub reason: StopReason,
    /// Frames shown on the display surface.
    pub frames: usize,
}

/// Read, detect, overlay, show and poll for quit, one frame per iteration,
/// until the stream ends or the user quits.
///
/// Owns the session and the display surface. Both are released exactly
/// once when `run` returns, whichever way it returns.
pub struct DisplayLoop {
    session: FaceMeshSession,
    surface: Box<dyn DisplaySurface>,
    logger: Box<dyn PipelineLogger>,
    query: PositionQuery,
    fps: FpsMeter,
    quit_poll: Duration,
    state: LoopState,
    frames: usize,
}

impl DisplayLoop {
    pub fn new(
        session: FaceMeshSession,
        surface: Box<dyn DisplaySurface>,
        logger: Box<dyn PipelineLogger>,
        query: PositionQuery,
    ) -> Self {
        Self {
            session,
            surface,
            logger,
            query,
            fps: FpsMeter::new(),
            quit_poll: Duration::from_millis(QUIT_POLL_MS),
            state: LoopState::Running,
            frames: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Runs one iteration. Does nothing once stopped.
    pub fn step(&mut self) -> Result<LoopState, SessionError> {
        if self.state != LoopState::Running {
            return Ok(self.state);
        }

        let screen = self.surface.screen_size();
        let Some(mut frame) = self.session.process_frame(screen, self.logger.as_mut())? else {
            log::info!("End of stream after {} frames", self.frames);
            self.state = LoopState::Stopped(StopReason::EndOfStream);
            return Ok(self.state);
        };

        let positions = self.session.find_position(
            &mut frame,
            self.query.face_no,
            self.query.draw,
            self.query.landmark_ids.as_ref(),
        );
        if self.query.print && !positions.is_empty() {
            let listed: Vec<(usize, i32, i32)> =
                positions.iter().map(|p| (p.id, p.x, p.y)).collect();
            log::info!("frame {}: {listed:?}", frame.index());
        }

        let fps = self.fps.tick();

        let t0 = Instant::now();
        self.surface.show(&frame, fps)?;
        self.logger
            .timing(STAGE_DISPLAY, t0.elapsed().as_secs_f64() * 1000.0);
        self.frames += 1;
        self.logger.frame_done(frame.index());

        if self.surface.poll_quit(self.quit_poll) {
            log::info!("Quit requested after {} frames", self.frames);
            self.state = LoopState::Stopped(StopReason::Quit);
        }
        Ok(self.state)
    }

    /// Steps until stopped, then releases the source and closes the
    /// surface. Errors stop the loop too, after the same cleanup.
    pub fn run(mut self) -> Result<LoopSummary, SessionError> {
        let outcome = self.run_until_stopped();
        self.session.release();
        self.surface.close();
        self.logger.summary();
        outcome.map(|reason| LoopSummary {
            reason,
            frames: self.frames,
        })
    }

    fn run_until_stopped(&mut self) -> Result<StopReason, SessionError> {
        loop {
            if let LoopState::Stopped(reason) = self.step()? {
                return Ok(reason);
            }
        }
    }
}
