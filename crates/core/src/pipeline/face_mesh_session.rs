use std::collections::HashSet;
use std::time::Instant;

use thiserror::Error;

use crate::capture::domain::frame_source::{CaptureError, FrameSource};
use crate::detection::domain::landmark::{DetectionResult, PixelLandmark};
use crate::detection::domain::landmark_detector::LandmarkDetector;
use crate::display::domain::display_surface::DisplayError;
use crate::overlay::domain::overlay_renderer::{DrawingSpec, OverlayRenderer};
use crate::pipeline::landmark_filter::select_landmarks;
use crate::pipeline::pipeline_logger::{
    PipelineLogger, METRIC_FACES, STAGE_DETECT, STAGE_OVERLAY, STAGE_READ, STAGE_RESIZE,
};
use crate::pipeline::screen_fit::resize_to_screen;
use crate::shared::frame::Frame;
use crate::shared::source_metadata::{SourceMetadata, SourceSpec};

/// Fatal conditions that end a face mesh session.
///
/// A failed frame read is not here: it ends the stream instead. Finding no
/// face is not here either: it is `DetectionResult::Empty`.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(#[source] CaptureError),
    #[error("display unavailable: {0}")]
    DisplayUnavailable(#[from] DisplayError),
    #[error("landmark detection failed: {0}")]
    Detection(String),
}

/// Everything one capture-detect-overlay run needs, passed around as a
/// single context instead of living in globals.
///
/// Owns the frame source from `open` until `release` (or drop) and keeps
/// the most recent detection so `find_position` can query it.
pub struct FaceMeshSession {
    source: Box<dyn FrameSource>,
    detector: Box<dyn LandmarkDetector>,
    renderer: Box<dyn OverlayRenderer>,
    metadata: SourceMetadata,
    results: DetectionResult,
    landmark_spec: DrawingSpec,
    connection_spec: DrawingSpec,
    position_spec: DrawingSpec,
    released: bool,
}

impl FaceMeshSession {
    /// Opens the source. If that fails the source is released before the
    /// error is returned, so no session ever exists without an open source.
    pub fn open(
        mut source: Box<dyn FrameSource>,
        spec: &SourceSpec,
        detector: Box<dyn LandmarkDetector>,
        renderer: Box<dyn OverlayRenderer>,
    ) -> Result<Self, SessionError> {
        let metadata = match source.open(spec) {
            Ok(metadata) => metadata,
            Err(e) => {
                source.release();
                return Err(SessionError::SourceUnavailable(e));
            }
        };
        log::debug!(
            "Session started on {} ({}x{}, {:.1} fps, {})",
            metadata.source,
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.codec
        );
        Ok(Self {
            source,
            detector,
            renderer,
            metadata,
            results: DetectionResult::Empty,
            landmark_spec: DrawingSpec::landmark(),
            connection_spec: DrawingSpec::connection(),
            position_spec: DrawingSpec::position(),
            released: false,
        })
    }

    pub fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    /// Detection result for the most recently processed frame.
    pub fn results(&self) -> &DetectionResult {
        &self.results
    }

    /// Reads the next frame, fits it to `screen_size`, detects faces and
    /// draws their meshes onto it.
    ///
    /// Returns `Ok(None)` at end-of-stream. A read error is logged and
    /// treated as end-of-stream.
    pub fn process_frame(
        &mut self,
        screen_size: (u32, u32),
        logger: &mut dyn PipelineLogger,
    ) -> Result<Option<Frame>, SessionError> {
        let t0 = Instant::now();
        let frame = match self.source.read() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(None),
            Err(e) => {
                log::warn!("Frame read failed, ending stream: {e}");
                return Ok(None);
            }
        };
        logger.timing(STAGE_READ, elapsed_ms(t0));

        let t0 = Instant::now();
        let mut frame = resize_to_screen(frame, screen_size);
        logger.timing(STAGE_RESIZE, elapsed_ms(t0));

        let t0 = Instant::now();
        // A failed detection must not leave the previous frame's faces behind.
        self.results = DetectionResult::Empty;
        self.results = self
            .detector
            .process(&frame)
            .map_err(|e| SessionError::Detection(e.to_string()))?;
        logger.timing(STAGE_DETECT, elapsed_ms(t0));
        logger.metric(METRIC_FACES, self.results.face_count() as f64);

        let t0 = Instant::now();
        let topology = self.detector.topology();
        for face in self.results.faces() {
            self.renderer.draw_mesh(
                &mut frame,
                face,
                topology,
                &self.landmark_spec,
                &self.connection_spec,
            );
        }
        logger.timing(STAGE_OVERLAY, elapsed_ms(t0));

        Ok(Some(frame))
    }

    /// Pixel positions of face `face_no` from the latest detection,
    /// filtered by `landmark_ids` (all landmarks when `None`).
    ///
    /// `frame` must be the frame that detection ran on. With `draw`, a
    /// position marker is drawn for each returned landmark. Empty when no
    /// face was found or `face_no` is out of range.
    pub fn find_position(
        &self,
        frame: &mut Frame,
        face_no: usize,
        draw: bool,
        landmark_ids: Option<&HashSet<usize>>,
    ) -> Vec<PixelLandmark> {
        let Some(face) = self.results.face(face_no) else {
            return Vec::new();
        };
        let positions = select_landmarks(face, frame.width(), frame.height(), landmark_ids);
        if draw {
            for p in &positions {
                self.renderer.draw_point(frame, p.x, p.y, &self.position_spec);
            }
        }
        positions
    }

    /// Closes the frame source. Later calls do nothing.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.source.release();
        log::debug!("Released {}", self.metadata.source);
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for FaceMeshSession {
    fn drop(&mut self) {
        self.release();
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::detection::domain::landmark::{Landmark, LandmarkSet};
    use crate::detection::domain::mesh_topology::MeshTopology;
    use crate::overlay::infrastructure::cpu_overlay_renderer::CpuOverlayRenderer;
    use crate::pipeline::pipeline_logger::{LogPipelineLogger, NullPipelineLogger};

    // --- Fakes ---

    /// Frame source over a fixed list of frames, or an endless stream of
    /// blank frames when `endless` is set.
    pub(crate) struct FakeSource {
        frames: VecDeque<Frame>,
        endless: Option<(u32, u32)>,
        next_index: usize,
        fail_open: bool,
        fail_read_at: Option<usize>,
        pub(crate) releases: Arc<AtomicUsize>,
    }

    impl FakeSource {
        pub(crate) fn with_frames(frames: Vec<Frame>) -> Self {
            Self {
                frames: frames.into(),
                endless: None,
                next_index: 0,
                fail_open: false,
                fail_read_at: None,
                releases: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(crate) fn endless(width: u32, height: u32) -> Self {
            Self {
                endless: Some((width, height)),
                ..Self::with_frames(Vec::new())
            }
        }

        pub(crate) fn failing_open() -> Self {
            Self {
                fail_open: true,
                ..Self::with_frames(Vec::new())
            }
        }

        pub(crate) fn fail_read_at(mut self, index: usize) -> Self {
            self.fail_read_at = Some(index);
            self
        }
    }

    impl FrameSource for FakeSource {
        fn open(&mut self, spec: &SourceSpec) -> Result<SourceMetadata, CaptureError> {
            if self.fail_open {
                return Err(CaptureError::Unavailable {
                    source_spec: spec.clone(),
                    reason: "no such device".into(),
                });
            }
            let (width, height) = self
                .endless
                .or_else(|| self.frames.front().map(|f| (f.width(), f.height())))
                .unwrap_or((0, 0));
            Ok(SourceMetadata {
                width,
                height,
                fps: 30.0,
                total_frames: self.frames.len(),
                codec: "fake".into(),
                source: spec.clone(),
            })
        }

        fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
            let index = self.next_index;
            self.next_index += 1;
            if self.fail_read_at == Some(index) {
                return Err(CaptureError::Decode("corrupt packet".into()));
            }
            if let Some((w, h)) = self.endless {
                return Ok(Some(Frame::blank(w, h, index)));
            }
            Ok(self.frames.pop_front())
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Detector that answers from a table keyed by frame index.
    pub(crate) struct ScriptedDetector {
        results: HashMap<usize, DetectionResult>,
        topology: MeshTopology,
        fail_at: Option<usize>,
        pub(crate) calls: Arc<AtomicUsize>,
    }

    impl ScriptedDetector {
        pub(crate) fn new(results: HashMap<usize, DetectionResult>) -> Self {
            Self {
                results,
                topology: MeshTopology::from_triangles(&[[0, 1, 2]]),
                fail_at: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(crate) fn empty() -> Self {
            Self::new(HashMap::new())
        }

        pub(crate) fn failing_at(mut self, index: usize) -> Self {
            self.fail_at = Some(index);
            self
        }
    }

    impl LandmarkDetector for ScriptedDetector {
        fn process(&mut self, frame: &Frame) -> Result<DetectionResult, Box<dyn std::error::Error>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_at == Some(frame.index()) {
                return Err("inference backend crashed".into());
            }
            Ok(self.results.get(&frame.index()).cloned().unwrap_or_default())
        }

        fn topology(&self) -> &MeshTopology {
            &self.topology
        }
    }

    /// A face whose first three landmarks form a visible triangle.
    pub(crate) fn one_face() -> DetectionResult {
        DetectionResult::from_faces(vec![LandmarkSet::new(vec![
            Landmark::new(0.5, 0.25, 0.0),
            Landmark::new(0.25, 0.75, 0.0),
            Landmark::new(0.75, 0.75, 0.0),
        ])])
    }

    /// Frame with a horizontal gradient so resizing is observable.
    pub(crate) fn gradient_frame(width: u32, height: u32, index: usize) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for _y in 0..height {
            for x in 0..width {
                let v = (x * 255 / width.max(1)) as u8;
                data.extend_from_slice(&[v, 128, 255 - v]);
            }
        }
        Frame::new(data, width, height, 3, index)
    }

    fn open_session(source: FakeSource, detector: ScriptedDetector) -> FaceMeshSession {
        FaceMeshSession::open(
            Box::new(source),
            &SourceSpec::Camera(0),
            Box::new(detector),
            Box::new(CpuOverlayRenderer::new()),
        )
        .unwrap()
    }

    // --- Tests ---

    #[test]
    fn test_open_failure_is_source_unavailable() {
        let source = FakeSource::failing_open();
        let releases = source.releases.clone();
        let result = FaceMeshSession::open(
            Box::new(source),
            &SourceSpec::Camera(3),
            Box::new(ScriptedDetector::empty()),
            Box::new(CpuOverlayRenderer::new()),
        );
        match result {
            Err(SessionError::SourceUnavailable(CaptureError::Unavailable { source_spec, .. })) => {
                assert_eq!(source_spec, SourceSpec::Camera(3));
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("expected failure"),
        }
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_process_frame_fits_to_screen() {
        let source = FakeSource::with_frames(vec![gradient_frame(64, 32, 0)]);
        let mut session = open_session(source, ScriptedDetector::empty());
        let frame = session
            .process_frame((32, 32), &mut NullPipelineLogger)
            .unwrap()
            .unwrap();
        assert_eq!((frame.width(), frame.height()), (32, 16));
    }

    #[test]
    fn test_frame_without_faces_is_untouched() {
        let original = gradient_frame(40, 30, 0);
        let expected = resize_to_screen(original.clone(), (20, 20));
        let mut session = open_session(
            FakeSource::with_frames(vec![original]),
            ScriptedDetector::empty(),
        );
        let frame = session
            .process_frame((20, 20), &mut NullPipelineLogger)
            .unwrap()
            .unwrap();
        assert!(session.results().is_empty());
        assert_eq!(frame, expected);
    }

    #[test]
    fn test_frame_with_face_gets_mesh() {
        let original = Frame::blank(40, 40, 0);
        let detector = ScriptedDetector::new(HashMap::from([(0, one_face())]));
        let mut session = open_session(FakeSource::with_frames(vec![original.clone()]), detector);
        let frame = session
            .process_frame((40, 40), &mut NullPipelineLogger)
            .unwrap()
            .unwrap();
        assert_eq!(session.results().face_count(), 1);
        assert_ne!(frame, original);
        // Landmark 0 at (0.5, 0.25) of a 40x40 frame.
        assert_eq!(frame.pixel(20, 10), &DrawingSpec::landmark().color);
    }

    #[test]
    fn test_end_of_stream_and_read_failure_both_end() {
        let source = FakeSource::with_frames(vec![Frame::blank(8, 8, 0), Frame::blank(8, 8, 1)])
            .fail_read_at(1);
        let mut session = open_session(source, ScriptedDetector::empty());
        let mut logger = NullPipelineLogger;
        assert!(session.process_frame((8, 8), &mut logger).unwrap().is_some());
        assert!(session.process_frame((8, 8), &mut logger).unwrap().is_none());
    }

    #[test]
    fn test_detector_failure_is_fatal() {
        let source = FakeSource::with_frames(vec![Frame::blank(8, 8, 0)]);
        let mut session = open_session(source, ScriptedDetector::empty().failing_at(0));
        let err = session
            .process_frame((8, 8), &mut NullPipelineLogger)
            .unwrap_err();
        assert!(matches!(err, SessionError::Detection(ref msg) if msg.contains("crashed")));
    }

    #[test]
    fn test_process_frame_records_stage_timings() {
        let detector = ScriptedDetector::new(HashMap::from([(0, one_face())]));
        let mut session = open_session(FakeSource::with_frames(vec![Frame::blank(8, 8, 0)]), detector);
        let mut logger = LogPipelineLogger::new(1);
        session.process_frame((8, 8), &mut logger).unwrap();
        for stage in [STAGE_READ, STAGE_RESIZE, STAGE_DETECT, STAGE_OVERLAY] {
            assert_eq!(logger.timings_for(stage).map(<[f64]>::len), Some(1), "{stage}");
        }
        assert_eq!(logger.metrics_for(METRIC_FACES).unwrap(), &[1.0]);
    }

    #[test]
    fn test_find_position_single_id() {
        let detector = ScriptedDetector::new(HashMap::from([(0, one_face())]));
        let mut session = open_session(
            FakeSource::with_frames(vec![Frame::blank(100, 100, 0)]),
            detector,
        );
        let mut frame = session
            .process_frame((100, 100), &mut NullPipelineLogger)
            .unwrap()
            .unwrap();
        let ids = HashSet::from([0]);
        let positions = session.find_position(&mut frame, 0, false, Some(&ids));
        assert_eq!(positions, vec![PixelLandmark { id: 0, x: 50, y: 25 }]);
    }

    #[test]
    fn test_find_position_all_and_draw() {
        let detector = ScriptedDetector::new(HashMap::from([(0, one_face())]));
        let mut session = open_session(
            FakeSource::with_frames(vec![Frame::blank(100, 100, 0)]),
            detector,
        );
        let mut frame = session
            .process_frame((100, 100), &mut NullPipelineLogger)
            .unwrap()
            .unwrap();
        let positions = session.find_position(&mut frame, 0, true, None);
        assert_eq!(positions.len(), 3);
        let marker = DrawingSpec::position().color;
        for p in &positions {
            assert_eq!(frame.pixel(p.x as u32, p.y as u32), &marker);
        }
        // Markers have radius 5.
        assert_eq!(frame.pixel(55, 25), &marker);
    }

    #[test]
    fn test_find_position_without_faces_or_out_of_range() {
        let detector = ScriptedDetector::new(HashMap::from([(1, one_face())]));
        let mut session = open_session(
            FakeSource::with_frames(vec![Frame::blank(10, 10, 0), Frame::blank(10, 10, 1)]),
            detector,
        );
        let mut logger = NullPipelineLogger;

        let mut frame = session.process_frame((10, 10), &mut logger).unwrap().unwrap();
        let before = frame.clone();
        assert!(session.find_position(&mut frame, 0, true, None).is_empty());
        assert_eq!(frame, before);

        let mut frame = session.process_frame((10, 10), &mut logger).unwrap().unwrap();
        assert!(session.find_position(&mut frame, 1, true, None).is_empty());
        assert_eq!(session.find_position(&mut frame, 0, false, None).len(), 3);
    }

    #[test]
    fn test_release_is_idempotent_and_runs_on_drop() {
        let source = FakeSource::with_frames(vec![]);
        let releases = source.releases.clone();
        let mut session = open_session(source, ScriptedDetector::empty());
        session.release();
        session.release();
        assert!(session.is_released());
        drop(session);
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        let source = FakeSource::with_frames(vec![]);
        let releases = source.releases.clone();
        drop(open_session(source, ScriptedDetector::empty()));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
