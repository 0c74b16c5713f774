use std::thread;
use std::time::{Duration, Instant};

use crate::capture::domain::frame_source::{CaptureError, FrameSource};
use crate::shared::constants::{CAMERA_CAPTURE_HEIGHT, CAMERA_CAPTURE_WIDTH};
use crate::shared::frame::Frame;
use crate::shared::source_metadata::{SourceMetadata, SourceSpec};

/// How long a device may keep answering EAGAIN before it counts as gone.
const DEVICE_STALL_TIMEOUT: Duration = Duration::from_secs(5);
const DEVICE_RETRY_WAIT: Duration = Duration::from_millis(2);

/// Reads camera devices and video files via ffmpeg-next.
///
/// Cameras go through libavdevice, files through the demuxer. Both are
/// decoded and converted to RGB24 one frame per `read` call.
pub struct FfmpegFrameSource {
    state: Option<DecodeState>,
}

// Safety: FfmpegFrameSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegFrameSource {}

impl FfmpegFrameSource {
    pub fn new() -> Self {
        Self { state: None }
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }
}

impl Default for FfmpegFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for FfmpegFrameSource {
    fn open(&mut self, spec: &SourceSpec) -> Result<SourceMetadata, CaptureError> {
        let unavailable = |reason: String| CaptureError::Unavailable {
            source_spec: spec.clone(),
            reason,
        };

        ffmpeg_next::init().map_err(|e| unavailable(e.to_string()))?;

        let input = match spec {
            SourceSpec::File(path) => {
                ffmpeg_next::format::input(path).map_err(|e| unavailable(e.to_string()))?
            }
            SourceSpec::Camera(index) => open_camera(*index).map_err(unavailable)?,
        };

        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| unavailable("no video stream found".to_string()))?;
        let stream_index = stream.index();

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };
        let total_frames = stream.frames().max(0) as usize;

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| unavailable(e.to_string()))?;
        let decoder = codec_ctx
            .decoder()
            .video()
            .map_err(|e| unavailable(e.to_string()))?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| unavailable(e.to_string()))?;

        let metadata = SourceMetadata {
            width,
            height,
            fps,
            total_frames,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            source: spec.clone(),
        };

        log::info!(
            "Opened {spec}: {width}x{height} @ {fps:.1} fps ({})",
            metadata.codec
        );

        self.state = Some(DecodeState {
            input,
            decoder,
            scaler,
            width,
            height,
            stream_index,
            frame_index: 0,
            flushing: false,
            done: false,
        });

        Ok(metadata)
    }

    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        match self.state.as_mut() {
            Some(state) => state.next_frame(),
            None => Err(CaptureError::NotOpened),
        }
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::debug!("Frame source released");
        }
    }
}

struct DecodeState {
    input: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    stream_index: usize,
    frame_index: usize,
    flushing: bool,
    done: bool,
}

impl DecodeState {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.done {
            return Ok(None);
        }
        let result = self.advance();
        if result.is_err() {
            self.done = true;
        }
        result
    }

    fn advance(&mut self) -> Result<Option<Frame>, CaptureError> {
        if let Some(frame) = self.try_receive()? {
            return Ok(Some(frame));
        }

        if self.flushing {
            self.done = true;
            return Ok(None);
        }

        let mut stalled_since: Option<Instant> = None;
        loop {
            let mut packet = ffmpeg_next::Packet::empty();
            match demux_status(packet.read(&mut self.input))? {
                DemuxStatus::Packet => stalled_since = None,
                DemuxStatus::Pending => {
                    let since = *stalled_since.get_or_insert_with(Instant::now);
                    if since.elapsed() >= DEVICE_STALL_TIMEOUT {
                        return Err(CaptureError::Decode(format!(
                            "no packet from device for {}s",
                            DEVICE_STALL_TIMEOUT.as_secs()
                        )));
                    }
                    thread::sleep(DEVICE_RETRY_WAIT);
                    continue;
                }
                DemuxStatus::EndOfInput => {
                    let _ = self.decoder.send_eof();
                    self.flushing = true;
                    let frame = self.try_receive()?;
                    if frame.is_none() {
                        self.done = true;
                    }
                    return Ok(frame);
                }
            }

            if packet.stream() != self.stream_index {
                continue;
            }

            codec_status(self.decoder.send_packet(&packet))?;

            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }
        }
    }

    fn try_receive(&mut self) -> Result<Option<Frame>, CaptureError> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if !codec_status(self.decoder.receive_frame(&mut decoded))? {
            return Ok(None);
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .map_err(|e| CaptureError::Decode(e.to_string()))?;

        let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
        let frame = Frame::new(pixels, self.width, self.height, 3, self.frame_index);
        self.frame_index += 1;
        Ok(Some(frame))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum DemuxStatus {
    Packet,
    /// The device has nothing buffered yet.
    Pending,
    EndOfInput,
}

/// Classifies the result of reading one packet from the demuxer. Anything
/// other than EOF or EAGAIN (an unplugged camera reports ENODEV or EIO) is
/// a read failure.
fn demux_status(result: Result<(), ffmpeg_next::Error>) -> Result<DemuxStatus, CaptureError> {
    match result {
        Ok(()) => Ok(DemuxStatus::Packet),
        Err(ffmpeg_next::Error::Eof) => Ok(DemuxStatus::EndOfInput),
        Err(e) if is_try_again(&e) => Ok(DemuxStatus::Pending),
        Err(e) => Err(CaptureError::Decode(format!("demuxer read failed: {e}"))),
    }
}

/// `Ok(true)` when a send/receive call on the decoder went through,
/// `Ok(false)` when the decoder wants more input or is drained.
fn codec_status(result: Result<(), ffmpeg_next::Error>) -> Result<bool, CaptureError> {
    match result {
        Ok(()) => Ok(true),
        Err(ffmpeg_next::Error::Eof) => Ok(false),
        Err(e) if is_try_again(&e) => Ok(false),
        Err(e) => Err(CaptureError::Decode(e.to_string())),
    }
}

fn is_try_again(error: &ffmpeg_next::Error) -> bool {
    matches!(error, ffmpeg_next::Error::Other { errno } if *errno == ffmpeg_next::error::EAGAIN)
}

/// Opens a capture device through the platform's libavdevice backend.
fn open_camera(index: u32) -> Result<ffmpeg_next::format::context::Input, String> {
    ffmpeg_next::device::register_all();

    let (backend, url) = camera_url(index);
    let requested = format!("{CAMERA_CAPTURE_WIDTH}x{CAMERA_CAPTURE_HEIGHT}");
    with_size_fallback(&requested, |video_size| {
        open_device(backend, &url, video_size)
    })
}

/// Tries `open` with the requested capture size first. Devices that reject
/// the size are reopened in their default mode.
fn with_size_fallback<T>(
    requested: &str,
    mut open: impl FnMut(Option<&str>) -> Result<T, String>,
) -> Result<T, String> {
    match open(Some(requested)) {
        Ok(device) => Ok(device),
        Err(e) => {
            log::warn!("Camera rejected video_size {requested} ({e}); using its default mode");
            open(None)
        }
    }
}

fn open_device(
    backend: &str,
    url: &str,
    video_size: Option<&str>,
) -> Result<ffmpeg_next::format::context::Input, String> {
    let format = ffmpeg_next::device::input::video()
        .find(|f| f.name() == backend)
        .ok_or_else(|| format!("capture backend '{backend}' is not available"))?;

    let mut options = ffmpeg_next::Dictionary::new();
    if let Some(size) = video_size {
        options.set("video_size", size);
    }

    let context = ffmpeg_next::format::open_with(
        &url,
        &ffmpeg_next::format::format::Format::Input(format),
        options,
    )
    .map_err(|e| format!("{url}: {e}"))?;

    match context {
        ffmpeg_next::format::context::Context::Input(input) => Ok(input),
        ffmpeg_next::format::context::Context::Output(_) => {
            Err(format!("{url} opened as an output device"))
        }
    }
}

/// libavdevice backend name and device URL for a camera index.
fn camera_url(index: u32) -> (&'static str, String) {
    #[cfg(target_os = "macos")]
    {
        ("avfoundation", format!("{index}"))
    }
    #[cfg(target_os = "windows")]
    {
        ("vfwcap", format!("{index}"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        ("video4linux2", format!("/dev/video{index}"))
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// dropping the per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rstest::rstest;
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    /// Encodes a small MPEG-4 clip whose frames are flat grey levels.
    pub(crate) fn create_test_video(path: &Path, num_frames: usize, width: u32, height: u32) {
        let fps = 30;
        ffmpeg_next::init().unwrap();

        let mut octx = ffmpeg_next::format::output(path).unwrap();
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4).unwrap();
        let mut ost = octx.add_stream(Some(codec)).unwrap();

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .unwrap();
        encoder_ctx.set_width(width);
        encoder_ctx.set_height(height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let mut encoder = encoder_ctx
            .open_with(ffmpeg_next::Dictionary::new())
            .unwrap();
        ost.set_parameters(&encoder);
        octx.write_header().unwrap();
        let ost_time_base = octx.stream(0).unwrap().time_base();

        let mut scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::format::Pixel::YUV420P,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .unwrap();

        let drain = |encoder: &mut ffmpeg_next::encoder::Video,
                         octx: &mut ffmpeg_next::format::context::Output| {
            let mut encoded = ffmpeg_next::Packet::empty();
            while encoder.receive_packet(&mut encoded).is_ok() {
                encoded.set_stream(0);
                encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
                encoded.write_interleaved(octx).unwrap();
            }
        };

        for i in 0..num_frames {
            let mut rgb_frame = ffmpeg_next::util::frame::video::Video::new(
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
            );
            let stride = rgb_frame.stride(0);
            let data = rgb_frame.data_mut(0);
            let value = ((i * 40) % 256) as u8;
            for row in 0..height as usize {
                let start = row * stride;
                data[start..start + width as usize * 3].fill(value);
            }

            let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
            scaler.run(&rgb_frame, &mut yuv_frame).unwrap();
            yuv_frame.set_pts(Some(i as i64));
            encoder.send_frame(&yuv_frame).unwrap();
            drain(&mut encoder, &mut octx);
        }

        encoder.send_eof().unwrap();
        drain(&mut encoder, &mut octx);
        octx.write_trailer().unwrap();
    }

    fn test_video(dir: &Path, frames: usize) -> PathBuf {
        let path = dir.join("face.mp4");
        create_test_video(&path, frames, 160, 120);
        path
    }

    #[test]
    fn test_open_returns_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video(dir.path(), 5);

        let mut source = FfmpegFrameSource::new();
        let meta = source.open(&SourceSpec::File(path.clone())).unwrap();
        assert_eq!(meta.width, 160);
        assert_eq!(meta.height, 120);
        assert!(meta.fps > 0.0);
        assert_eq!(meta.source, SourceSpec::File(path));
    }

    #[test]
    fn test_open_nonexistent_is_unavailable() {
        let mut source = FfmpegFrameSource::new();
        let err = source
            .open(&SourceSpec::File(PathBuf::from("/nonexistent/face.mp4")))
            .unwrap_err();
        assert!(matches!(err, CaptureError::Unavailable { .. }));
        assert!(!source.is_open());
    }

    #[test]
    fn test_read_until_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video(dir.path(), 5);

        let mut source = FfmpegFrameSource::new();
        source.open(&SourceSpec::File(path)).unwrap();

        let mut indices = Vec::new();
        while let Some(frame) = source.read().unwrap() {
            assert_eq!(frame.channels(), 3);
            assert_eq!(frame.data().len(), 160 * 120 * 3);
            indices.push(frame.index());
        }
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_read_after_end_keeps_returning_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video(dir.path(), 2);

        let mut source = FfmpegFrameSource::new();
        source.open(&SourceSpec::File(path)).unwrap();
        while source.read().unwrap().is_some() {}
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn test_read_without_open_is_error() {
        let mut source = FfmpegFrameSource::new();
        assert!(matches!(source.read(), Err(CaptureError::NotOpened)));
    }

    #[test]
    fn test_release_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video(dir.path(), 1);

        let mut source = FfmpegFrameSource::new();
        source.open(&SourceSpec::File(path)).unwrap();
        source.release();
        source.release();
        assert!(!source.is_open());
        assert!(matches!(source.read(), Err(CaptureError::NotOpened)));
    }

    #[test]
    fn test_camera_url_names_a_device() {
        let (backend, url) = camera_url(1);
        assert!(!backend.is_empty());
        assert!(url.ends_with('1'));
    }

    #[rstest]
    #[case::packet(Ok(()), DemuxStatus::Packet)]
    #[case::end_of_file(Err(ffmpeg_next::Error::Eof), DemuxStatus::EndOfInput)]
    #[case::device_busy(
        Err(ffmpeg_next::Error::Other { errno: ffmpeg_next::error::EAGAIN }),
        DemuxStatus::Pending
    )]
    fn test_demux_status(
        #[case] result: Result<(), ffmpeg_next::Error>,
        #[case] expected: DemuxStatus,
    ) {
        assert_eq!(demux_status(result).unwrap(), expected);
    }

    #[rstest]
    #[case::device_gone(ffmpeg_next::Error::Other { errno: ffmpeg_next::error::ENODEV })]
    #[case::io(ffmpeg_next::Error::Other { errno: ffmpeg_next::error::EIO })]
    #[case::corrupt(ffmpeg_next::Error::InvalidData)]
    fn test_demux_failure_is_read_error(#[case] error: ffmpeg_next::Error) {
        assert!(matches!(demux_status(Err(error)), Err(CaptureError::Decode(_))));
    }

    #[test]
    fn test_codec_status() {
        assert!(codec_status(Ok(())).unwrap());
        assert!(!codec_status(Err(ffmpeg_next::Error::Eof)).unwrap());
        let again = ffmpeg_next::Error::Other {
            errno: ffmpeg_next::error::EAGAIN,
        };
        assert!(!codec_status(Err(again)).unwrap());
        assert!(matches!(
            codec_status(Err(ffmpeg_next::Error::InvalidData)),
            Err(CaptureError::Decode(_))
        ));
    }

    #[test]
    fn test_size_fallback_keeps_accepted_size() {
        let calls = RefCell::new(Vec::new());
        let opened = with_size_fallback("1920x1080", |size| {
            calls.borrow_mut().push(size.map(str::to_string));
            Ok::<_, String>("device")
        });
        assert_eq!(opened.unwrap(), "device");
        assert_eq!(*calls.borrow(), vec![Some("1920x1080".to_string())]);
    }

    #[test]
    fn test_size_fallback_reopens_in_default_mode() {
        let calls = RefCell::new(Vec::new());
        let opened = with_size_fallback("1920x1080", |size| {
            calls.borrow_mut().push(size.map(str::to_string));
            match size {
                Some(_) => Err("unsupported size".to_string()),
                None => Ok("device"),
            }
        });
        assert_eq!(opened.unwrap(), "device");
        assert_eq!(*calls.borrow(), vec![Some("1920x1080".to_string()), None]);
    }

    #[test]
    fn test_size_fallback_reports_default_mode_failure() {
        let opened: Result<(), String> = with_size_fallback("1920x1080", |size| match size {
            Some(_) => Err("unsupported size".to_string()),
            None => Err("no such device".to_string()),
        });
        assert_eq!(opened.unwrap_err(), "no such device");
    }
}
