mod app;
mod workers;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use facemesh_core::capture::infrastructure::ffmpeg_frame_source::FfmpegFrameSource;
use facemesh_core::detection::domain::landmark_detector::{DetectorConfig, LandmarkDetector};
use facemesh_core::detection::domain::mesh_topology::MeshTopology;
use facemesh_core::detection::infrastructure::onnx_blazeface_detector::OnnxBlazefaceDetector;
use facemesh_core::detection::infrastructure::onnx_face_mesh_detector::OnnxFaceMeshDetector;
use facemesh_core::display::domain::display_surface::DisplayError;
use facemesh_core::overlay::infrastructure::cpu_overlay_renderer::CpuOverlayRenderer;
use facemesh_core::pipeline::display_loop::PositionQuery;
use facemesh_core::pipeline::face_mesh_session::{FaceMeshSession, SessionError};
use facemesh_core::pipeline::pipeline_logger::LogPipelineLogger;
use facemesh_core::shared::constants::{
    FACE_DETECTOR_MODEL_NAME, LANDMARK_MODEL_NAME, MESH_TOPOLOGY_NAME, MESH_TOPOLOGY_URL,
    VIDEO_EXTENSIONS,
};
use facemesh_core::shared::model_resolver::{self, ModelLookup};
use facemesh_core::shared::source_metadata::SourceSpec;

use app::App;
use workers::display_worker;

/// Live face mesh overlay for a camera or a video file. Press `q` to quit.
#[derive(Parser, Debug)]
#[command(name = "facemesh")]
struct Cli {
    /// Camera index to capture from.
    #[arg(long, default_value = "0")]
    camera: u32,

    /// Video file to play instead of a camera.
    #[arg(long)]
    video: Option<PathBuf>,

    /// Detect faces from scratch on every frame instead of tracking them.
    #[arg(long)]
    static_image_mode: bool,

    /// Maximum number of faces to detect.
    #[arg(long, default_value = "1")]
    max_num_faces: usize,

    /// Minimum face detector confidence (0.0-1.0).
    #[arg(long, default_value = "0.5")]
    min_detection_confidence: f64,

    /// Minimum landmark confidence to keep tracking a face (0.0-1.0).
    #[arg(long, default_value = "0.5")]
    min_tracking_confidence: f64,

    /// Landmark indices to report and mark (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "0")]
    landmark_ids: Vec<usize>,

    /// Report and mark every landmark, ignoring --landmark-ids.
    #[arg(long)]
    all_landmarks: bool,

    /// Which detected face to report positions for.
    #[arg(long, default_value = "0")]
    face_no: usize,

    /// Do not draw position markers.
    #[arg(long)]
    no_draw_position: bool,

    /// Log the reported landmark positions for every frame.
    #[arg(long)]
    print_landmarks: bool,

    /// BlazeFace short-range ONNX model (MediaPipe's face_detection_short_range
    /// converted to ONNX).
    #[arg(long)]
    face_detector_model: Option<PathBuf>,

    /// Face landmark ONNX model (MediaPipe's face_landmark converted to ONNX).
    #[arg(long)]
    landmark_model: Option<PathBuf>,

    /// Canonical face model OBJ providing the mesh tessellation.
    #[arg(long)]
    mesh_topology: Option<PathBuf>,

    /// Initial window width; frames are fitted inside the window.
    #[arg(long, default_value = "1280")]
    window_width: u32,

    /// Initial window height.
    #[arg(long, default_value = "720")]
    window_height: u32,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let detector = build_detector(&cli)?;
    let source_spec = SourceSpec::from_options(cli.camera, cli.video.clone());
    let session = FaceMeshSession::open(
        Box::new(FfmpegFrameSource::new()),
        &source_spec,
        detector,
        Box::new(CpuOverlayRenderer::new()),
    )?;

    let metadata = session.metadata();
    let title = format!(
        "Face Mesh ({source_spec}, {}x{})",
        metadata.width, metadata.height
    );

    let query = position_query(&cli);
    let (link, worker) = display_worker::spawn(
        session,
        query,
        Box::new(LogPipelineLogger::default()),
        (cli.window_width, cli.window_height),
    );

    let ui_result = iced::application(move || App::new(link.clone()), App::update, App::view)
        .title(move |_: &App| title.clone())
        .subscription(App::subscription)
        .window(iced::window::Settings {
            size: iced::Size::new(cli.window_width as f32, cli.window_height as f32),
            ..Default::default()
        })
        .run();

    // The window is gone: the worker sees the quit channel close on its
    // next poll, stops, and releases the source before join returns.
    let loop_result = worker.join().map_err(|_| "display worker panicked")?;

    ui_result.map_err(|e| {
        SessionError::DisplayUnavailable(DisplayError::Unavailable(e.to_string()))
    })?;
    let summary = loop_result?;
    log::info!("Stopped ({:?}) after {} frames", summary.reason, summary.frames);
    Ok(())
}

fn build_detector(cli: &Cli) -> Result<Box<dyn LandmarkDetector>, Box<dyn std::error::Error>> {
    let bundled = bundled_models_dir();
    let bundled = bundled.as_deref();

    log::info!("Resolving models");
    let topology_path = model_resolver::resolve(
        &ModelLookup {
            name: MESH_TOPOLOGY_NAME,
            explicit: cli.mesh_topology.as_deref(),
            bundled_dir: bundled,
            url: Some(MESH_TOPOLOGY_URL),
        },
        Some(Box::new(download_progress)),
    )?;
    let detector_path = model_resolver::resolve(
        &ModelLookup {
            name: FACE_DETECTOR_MODEL_NAME,
            explicit: cli.face_detector_model.as_deref(),
            bundled_dir: bundled,
            url: None,
        },
        None,
    )?;
    let landmark_path = model_resolver::resolve(
        &ModelLookup {
            name: LANDMARK_MODEL_NAME,
            explicit: cli.landmark_model.as_deref(),
            bundled_dir: bundled,
            url: None,
        },
        None,
    )?;

    let topology = MeshTopology::from_obj_file(&topology_path)?;
    log::info!(
        "Loaded mesh topology: {} edges from {}",
        topology.len(),
        topology_path.display()
    );

    let config = detector_config(cli);
    let face_detector = OnnxBlazefaceDetector::new(
        &detector_path,
        config.min_detection_confidence,
        config.max_num_faces,
    )?;
    Ok(Box::new(OnnxFaceMeshDetector::new(
        Box::new(face_detector),
        &landmark_path,
        config,
        topology,
    )?))
}

fn detector_config(cli: &Cli) -> DetectorConfig {
    DetectorConfig {
        static_image_mode: cli.static_image_mode,
        max_num_faces: cli.max_num_faces,
        min_detection_confidence: cli.min_detection_confidence,
        min_tracking_confidence: cli.min_tracking_confidence,
    }
}

fn position_query(cli: &Cli) -> PositionQuery {
    let landmark_ids = if cli.all_landmarks {
        None
    } else {
        Some(cli.landmark_ids.iter().copied().collect::<HashSet<usize>>())
    };
    PositionQuery {
        face_no: cli.face_no,
        draw: !cli.no_draw_position,
        landmark_ids,
        print: cli.print_landmarks,
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(video) = &cli.video {
        if !video.exists() {
            return Err(format!("Video file not found: {}", video.display()).into());
        }
        if !is_video(video) {
            log::warn!(
                "{} has no known video extension; trying to decode it anyway",
                video.display()
            );
        }
    }
    detector_config(cli).validate()?;
    if cli.window_width == 0 || cli.window_height == 0 {
        return Err(format!(
            "Window size must be positive, got {}x{}",
            cli.window_width, cli.window_height
        )
        .into());
    }
    for path in [
        &cli.face_detector_model,
        &cli.landmark_model,
        &cli.mesh_topology,
    ]
    .into_iter()
    .flatten()
    {
        if !path.exists() {
            return Err(format!("Model file not found: {}", path.display()).into());
        }
    }
    Ok(())
}

/// `models/` next to the executable, where packaged builds ship assets.
fn bundled_models_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    exe.parent().map(|dir| dir.join("models"))
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading mesh topology... {pct}%");
    } else {
        eprint!("\rDownloading mesh topology... {downloaded} bytes");
    }
    if total > 0 && downloaded >= total {
        eprintln!();
    }
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("facemesh").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_parse_and_validate() {
        let cli = parse(&[]);
        assert_eq!(cli.camera, 0);
        assert!(cli.video.is_none());
        assert_eq!(detector_config(&cli), DetectorConfig::default());
        let query = position_query(&cli);
        assert_eq!(query, PositionQuery::default());
        assert!(validate(&cli).is_ok());
    }

    #[test]
    fn test_landmark_ids_list() {
        let cli = parse(&["--landmark-ids", "1,33,263", "--face-no", "2", "--no-draw-position"]);
        let query = position_query(&cli);
        assert_eq!(query.landmark_ids, Some(HashSet::from([1, 33, 263])));
        assert_eq!(query.face_no, 2);
        assert!(!query.draw);
    }

    #[test]
    fn test_all_landmarks_clears_filter() {
        let cli = parse(&["--all-landmarks", "--print-landmarks"]);
        let query = position_query(&cli);
        assert_eq!(query.landmark_ids, None);
        assert!(query.print);
    }

    #[rstest]
    #[case::zero_faces(&["--max-num-faces", "0"])]
    #[case::detection_confidence(&["--min-detection-confidence", "1.5"])]
    #[case::tracking_confidence(&["--min-tracking-confidence", "-0.1"])]
    #[case::window(&["--window-width", "0"])]
    #[case::missing_video(&["--video", "/nonexistent/clip.mp4"])]
    #[case::missing_model(&["--landmark-model", "/nonexistent/face_landmark.onnx"])]
    fn test_validate_rejects(#[case] args: &[&str]) {
        assert!(validate(&parse(args)).is_err());
    }

    #[test]
    fn test_validate_accepts_existing_video() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"").unwrap();
        let cli = parse(&["--video", video.to_str().unwrap()]);
        assert!(validate(&cli).is_ok());
        assert_eq!(
            SourceSpec::from_options(cli.camera, cli.video.clone()),
            SourceSpec::File(video)
        );
    }
}
