//! FFmpeg-backed video sessions and log level configuration.
//!
//! [`FfmpegVideo`] implements [`VideoSource`] on top of `ffmpeg-next`.
//! Every session it hands out opens its own demuxer on the file, so an
//! indexing pass and an export run can proceed side by side. The FFmpeg
//! contexts of a session are created and used on a dedicated thread; the
//! returned reader or generator only talks to it over channels.
//!
//! FFmpeg also has its own internal logging system, separate from the Rust
//! [`log`](https://crates.io/crates/log) crate, which prints warnings and
//! errors to stderr. [`set_ffmpeg_log_level`] silences or tunes it.
//!
//! # Example
//!
//! ```no_run
//! use stillframe::{FfmpegLogLevel, FfmpegVideo, VideoSource};
//!
//! stillframe::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//!
//! let video = FfmpegVideo::open("input.mp4")?;
//! for track in video.tracks()? {
//!     println!("track {} is {:?} ({}x{})", track.index, track.kind, track.width, track.height);
//! }
//! # Ok::<(), stillframe::StillframeError>(())
//! ```
//!
//! # Note
//!
//! The log level controls **FFmpeg's own console output**, not the
//! Rust-side diagnostic messages emitted via the `log` crate. To configure
//! those, use a standard `log` subscriber such as `env_logger`.

use std::mem;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use ffmpeg_next::{
    Error as FfmpegError, Packet, Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
    util::log::Level,
};
use image::{DynamicImage, RgbImage};

use crate::error::StillframeError;
use crate::media::{
    FrameGenerator, GeneratedFrame, ReadStatus, SampleTimingReader, TrackInfo, TrackKind,
    VideoSource,
};
use crate::sample_timing::SampleTiming;
use crate::time::{MediaTime, RoundingMethod};

/// Packets per batch handed to the indexer.
const PACKETS_PER_BATCH: usize = 512;

/// POSIX `EINTR`, which FFmpeg reports as a negated errno.
const EINTR: i32 = 4;

/// A video file opened through FFmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegVideo {
    path: PathBuf,
}

impl FfmpegVideo {
    /// Open a video file and check that FFmpeg can read its container.
    ///
    /// # Errors
    ///
    /// Returns [`StillframeError::InvalidVideo`] if the file cannot be
    /// opened as a media container.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StillframeError> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Opening video file: {}", path.display());

        ffmpeg_next::init().map_err(StillframeError::from)?;
        ffmpeg_next::format::input(&path).map_err(|error| {
            log::debug!("Failed to open {}: {}", path.display(), error);
            StillframeError::InvalidVideo
        })?;

        Ok(Self { path })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_input(&self) -> Result<Input, StillframeError> {
        ffmpeg_next::format::input(&self.path).map_err(StillframeError::from)
    }
}

impl VideoSource for FfmpegVideo {
    fn tracks(&self) -> Result<Vec<TrackInfo>, StillframeError> {
        let input = self.open_input()?;
        let tracks = input
            .streams()
            .map(|stream| {
                let parameters = stream.parameters();
                let kind = match parameters.medium() {
                    Type::Video => TrackKind::Video,
                    Type::Audio => TrackKind::Audio,
                    _ => TrackKind::Other,
                };
                let (decodable, width, height) = if kind == TrackKind::Video {
                    match CodecContext::from_parameters(parameters)
                        .and_then(|context| context.decoder().video())
                    {
                        Ok(decoder) => (true, decoder.width(), decoder.height()),
                        Err(_) => (false, 0, 0),
                    }
                } else {
                    let decodable = ffmpeg_next::decoder::find(stream.parameters().id()).is_some();
                    (decodable, 0, 0)
                };
                TrackInfo {
                    index: stream.index(),
                    kind,
                    timescale: stream.time_base().denominator(),
                    decodable,
                    width,
                    height,
                }
            })
            .collect();
        Ok(tracks)
    }

    fn sample_timing_reader(
        &self,
        track: &TrackInfo,
    ) -> Result<Box<dyn SampleTimingReader>, StillframeError> {
        let path = self.path.clone();
        let stream_index = track.index;
        let (ready, opened) = mpsc::sync_channel(1);
        let (batches, messages) = mpsc::sync_channel(1);

        thread::Builder::new()
            .name("stillframe-packet-reader".to_string())
            .spawn(move || {
                let (mut input, time_base) = match open_stream(&path, stream_index) {
                    Ok(session) => {
                        let _ = ready.send(Ok(()));
                        session
                    }
                    Err(error) => {
                        let _ = ready.send(Err(error));
                        return;
                    }
                };
                loop {
                    let (batch, finished) = read_packet_batch(&mut input, stream_index, time_base);
                    if !batch.is_empty() && batches.send(ReaderMessage::Batch(batch)).is_err() {
                        return;
                    }
                    if let Some(status) = finished {
                        let _ = batches.send(ReaderMessage::Finished(status));
                        return;
                    }
                }
            })?;
        wait_until_open(&opened)?;

        Ok(Box::new(PacketTimingReader {
            messages,
            status: ReadStatus::Completed,
            done: false,
        }))
    }

    fn frame_generator(
        &self,
        max_size: Option<(u32, u32)>,
    ) -> Result<Box<dyn FrameGenerator>, StillframeError> {
        // Same track the indexer reads.
        let track = self
            .primary_video_track()?
            .ok_or(StillframeError::InvalidVideo)?;
        let path = self.path.clone();
        let (ready, opened) = mpsc::sync_channel(1);
        let (requests, pending) = mpsc::channel::<MediaTime>();
        let (frames, results) = mpsc::sync_channel(1);

        thread::Builder::new()
            .name(format!("stillframe-decoder-{}", track.index))
            .spawn(move || {
                let mut session = match DecodingSession::open(&path, track.index, max_size) {
                    Ok(session) => {
                        let _ = ready.send(Ok(()));
                        session
                    }
                    Err(error) => {
                        let _ = ready.send(Err(error));
                        return;
                    }
                };
                for time in pending {
                    if frames.send(session.generate(time)).is_err() {
                        return;
                    }
                }
            })?;
        wait_until_open(&opened)?;

        Ok(Box::new(DecodingFrameGenerator { requests, results }))
    }
}

fn open_stream(path: &Path, stream_index: usize) -> Result<(Input, Rational), StillframeError> {
    let input = ffmpeg_next::format::input(path)?;
    let time_base = input
        .stream(stream_index)
        .ok_or(StillframeError::TrackNotFound {
            track_index: stream_index,
            track_count: input.streams().count(),
        })?
        .time_base();
    Ok((input, time_base))
}

fn wait_until_open(opened: &Receiver<Result<(), StillframeError>>) -> Result<(), StillframeError> {
    opened.recv().unwrap_or_else(|_| Err(session_closed()))
}

fn session_closed() -> StillframeError {
    StillframeError::FfmpegError("FFmpeg session thread exited".to_string())
}

/// Convert a timestamp in `time_base` units to a [`MediaTime`] whose
/// timescale is the time base's denominator.
fn stream_time(timestamp: i64, time_base: Rational) -> MediaTime {
    let value = timestamp.saturating_mul(i64::from(time_base.numerator()));
    MediaTime::new(value, time_base.denominator()).unwrap_or(MediaTime::ZERO)
}

/// Largest size with the source aspect ratio that fits in `max_size`.
/// Never upscales.
fn fit_within(width: u32, height: u32, max_size: Option<(u32, u32)>) -> (u32, u32) {
    let Some((max_width, max_height)) = max_size else {
        return (width, height);
    };
    if width == 0 || height == 0 || (width <= max_width && height <= max_height) {
        return (width, height);
    }
    let scale = f64::min(
        f64::from(max_width) / f64::from(width),
        f64::from(max_height) / f64::from(height),
    );
    let fitted_width = ((f64::from(width) * scale).round() as u32).max(1);
    let fitted_height = ((f64::from(height) * scale).round() as u32).max(1);
    (fitted_width, fitted_height)
}

enum ReaderMessage {
    Batch(Vec<SampleTiming>),
    Finished(ReadStatus),
}

/// Read up to one batch of packet timings. The second value is set once the
/// demuxer has nothing more to give.
fn read_packet_batch(
    input: &mut Input,
    stream_index: usize,
    time_base: Rational,
) -> (Vec<SampleTiming>, Option<ReadStatus>) {
    let mut batch = Vec::with_capacity(PACKETS_PER_BATCH);
    while batch.len() < PACKETS_PER_BATCH {
        let mut packet = Packet::empty();
        match packet.read(input) {
            Ok(()) => {
                if packet.stream() != stream_index {
                    continue;
                }
                let Some(pts) = packet.pts().or(packet.dts()) else {
                    continue;
                };
                batch.push(SampleTiming::new(
                    stream_time(pts, time_base),
                    stream_time(packet.duration(), time_base),
                ));
            }
            Err(FfmpegError::Eof) => return (batch, Some(ReadStatus::Completed)),
            Err(FfmpegError::Other { errno }) if errno == EINTR => {
                return (batch, Some(ReadStatus::Interrupted));
            }
            Err(error) => return (batch, Some(ReadStatus::Failed(error.to_string()))),
        }
    }
    (batch, None)
}

/// Receives packet timings from the demuxer thread.
///
/// The demuxer stays on its own thread. Dropping the reader closes the
/// channel and that thread exits after its current batch.
struct PacketTimingReader {
    messages: Receiver<ReaderMessage>,
    status: ReadStatus,
    done: bool,
}

impl SampleTimingReader for PacketTimingReader {
    fn next_batch(&mut self) -> Option<Vec<SampleTiming>> {
        if self.done {
            return None;
        }
        match self.messages.recv() {
            Ok(ReaderMessage::Batch(batch)) => Some(batch),
            Ok(ReaderMessage::Finished(status)) => {
                self.status = status;
                self.done = true;
                None
            }
            Err(_) => {
                self.status = ReadStatus::Failed("packet reader thread exited".to_string());
                self.done = true;
                None
            }
        }
    }

    fn status(&self) -> ReadStatus {
        self.status.clone()
    }
}

/// Hands requested times to the decoder thread and waits for each frame.
struct DecodingFrameGenerator {
    requests: Sender<MediaTime>,
    results: Receiver<Result<GeneratedFrame, StillframeError>>,
}

impl FrameGenerator for DecodingFrameGenerator {
    fn generate(&mut self, time: MediaTime) -> Result<GeneratedFrame, StillframeError> {
        self.requests.send(time).map_err(|_| session_closed())?;
        self.results.recv().map_err(|_| session_closed())?
    }
}

/// What to do with a frame offered to a [`DisplaySelector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    /// The frame is on screen at or before the target; keep it.
    Hold,
    /// An older frame than the one held; drop it.
    Skip,
    /// The frame starts after the target, so the held frame is the answer.
    ShowHeld,
    /// The target precedes every frame seen; this first frame is the answer.
    ShowOffered,
}

/// Picks the frame displayed at `target` from frames arriving in decode
/// output order: the latest frame starting at or before the target.
#[derive(Debug)]
struct DisplaySelector {
    target: MediaTime,
    held: Option<MediaTime>,
}

impl DisplaySelector {
    fn new(target: MediaTime) -> Self {
        Self { target, held: None }
    }

    fn offer(&mut self, time: MediaTime) -> Selection {
        if time <= self.target {
            if self.held.is_some_and(|held| time < held) {
                return Selection::Skip;
            }
            self.held = Some(time);
            Selection::Hold
        } else if self.held.is_some() {
            Selection::ShowHeld
        } else {
            Selection::ShowOffered
        }
    }

    fn held(&self) -> Option<MediaTime> {
        self.held
    }
}

/// Seeks and decodes frames from one demuxer/decoder pair. Lives on the
/// decoder thread only.
struct DecodingSession {
    input: Input,
    stream_index: usize,
    time_base: Rational,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    width: u32,
    height: u32,
}

impl DecodingSession {
    fn open(
        path: &Path,
        stream_index: usize,
        max_size: Option<(u32, u32)>,
    ) -> Result<Self, StillframeError> {
        let (input, time_base) = open_stream(path, stream_index)?;
        let parameters = input
            .stream(stream_index)
            .ok_or(StillframeError::InvalidVideo)?
            .parameters();
        let decoder = CodecContext::from_parameters(parameters)?
            .decoder()
            .video()?;

        let (width, height) = fit_within(decoder.width(), decoder.height(), max_size);
        let scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            width,
            height,
            ScalingFlags::BILINEAR,
        )?;
        log::debug!(
            "Frame generator ready (stream={}, output={}x{})",
            stream_index,
            width,
            height
        );

        Ok(Self {
            input,
            stream_index,
            time_base,
            decoder,
            scaler,
            width,
            height,
        })
    }

    fn to_image(&mut self, decoded: &VideoFrame) -> Result<DynamicImage, StillframeError> {
        let mut rgb_frame = VideoFrame::empty();
        self.scaler.run(decoded, &mut rgb_frame)?;
        let buffer = frame_to_buffer(&rgb_frame, self.width, self.height, 3);
        RgbImage::from_raw(self.width, self.height, buffer)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| {
                StillframeError::FfmpegError("decoded frame has an unexpected size".to_string())
            })
    }

    fn frame_time(&self, decoded: &VideoFrame) -> MediaTime {
        stream_time(
            decoded.timestamp().or(decoded.pts()).unwrap_or(0),
            self.time_base,
        )
    }

    fn finish(
        &mut self,
        frame: &VideoFrame,
        requested_time: MediaTime,
        actual_time: MediaTime,
    ) -> Result<GeneratedFrame, StillframeError> {
        Ok(GeneratedFrame {
            image: self.to_image(frame)?,
            requested_time,
            actual_time,
        })
    }

    fn generate(&mut self, time: MediaTime) -> Result<GeneratedFrame, StillframeError> {
        let seek_target = time
            .convert_scale(1_000_000, RoundingMethod::Down)
            .value();
        self.input.seek(seek_target, ..seek_target)?;
        self.decoder.flush();

        let mut selector = DisplaySelector::new(time);
        let mut decoded = VideoFrame::empty();
        let mut held = VideoFrame::empty();
        let mut eof_sent = false;
        loop {
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let frame_time = self.frame_time(&decoded);
                match selector.offer(frame_time) {
                    Selection::Hold => mem::swap(&mut held, &mut decoded),
                    Selection::Skip => {}
                    Selection::ShowHeld => {
                        let held_time = selector.held().unwrap_or(frame_time);
                        return self.finish(&held, time, held_time);
                    }
                    Selection::ShowOffered => return self.finish(&decoded, time, frame_time),
                }
            }
            if eof_sent {
                break;
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() == self.stream_index {
                        self.decoder.send_packet(&packet)?;
                    }
                }
                Err(FfmpegError::Eof) => {
                    self.decoder.send_eof()?;
                    eof_sent = true;
                }
                Err(error) => return Err(error.into()),
            }
        }

        // The last frame of the stream stays on screen until the end.
        match selector.held() {
            Some(held_time) => self.finish(&held, time, held_time),
            None => Err(StillframeError::FfmpegError(format!("no frame at {time}"))),
        }
    }
}

/// Copy pixel data from an FFmpeg video frame into a tightly-packed buffer.
fn frame_to_buffer(video_frame: &VideoFrame, width: u32, height: u32, bytes_per_pixel: usize) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_length = (width as usize) * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == row_length {
        data[..row_length * (height as usize)].to_vec()
    } else {
        (0..height as usize)
            .flat_map(|row| &data[row * stride..row * stride + row_length])
            .copied()
            .collect()
    }
}

/// FFmpeg internal log verbosity level.
///
/// Maps directly to FFmpeg's `AV_LOG_*` constants. Setting a level causes
/// FFmpeg to suppress all messages below that severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print no output at all.
    Quiet,
    /// Only unrecoverable errors that abort the process.
    Panic,
    /// Only unrecoverable errors.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Verbose informational messages.
    Verbose,
    /// Debugging messages.
    Debug,
    /// Extremely verbose tracing output.
    Trace,
}

impl FfmpegLogLevel {
    /// Parse a level name such as `quiet`, `error`, or `warning`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "quiet" => Some(FfmpegLogLevel::Quiet),
            "panic" => Some(FfmpegLogLevel::Panic),
            "fatal" => Some(FfmpegLogLevel::Fatal),
            "error" => Some(FfmpegLogLevel::Error),
            "warning" | "warn" => Some(FfmpegLogLevel::Warning),
            "info" => Some(FfmpegLogLevel::Info),
            "verbose" => Some(FfmpegLogLevel::Verbose),
            "debug" => Some(FfmpegLogLevel::Debug),
            "trace" => Some(FfmpegLogLevel::Trace),
            _ => None,
        }
    }

    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }

    fn from_ffmpeg_level(level: Level) -> Self {
        match level {
            Level::Quiet => FfmpegLogLevel::Quiet,
            Level::Panic => FfmpegLogLevel::Panic,
            Level::Fatal => FfmpegLogLevel::Fatal,
            Level::Error => FfmpegLogLevel::Error,
            Level::Warning => FfmpegLogLevel::Warning,
            Level::Info => FfmpegLogLevel::Info,
            Level::Verbose => FfmpegLogLevel::Verbose,
            Level::Debug => FfmpegLogLevel::Debug,
            Level::Trace => FfmpegLogLevel::Trace,
        }
    }
}

/// Set the FFmpeg internal log verbosity level.
///
/// This controls what FFmpeg prints to stderr. It does **not** affect
/// Rust-side `log` crate output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

/// Get the current FFmpeg internal log verbosity level, if it maps to a
/// known variant.
pub fn get_ffmpeg_log_level() -> Option<FfmpegLogLevel> {
    ffmpeg_next::util::log::get_level()
        .ok()
        .map(FfmpegLogLevel::from_ffmpeg_level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_within_keeps_aspect_ratio() {
        assert_eq!(fit_within(1920, 1080, Some((640, 640))), (640, 360));
        assert_eq!(fit_within(1080, 1920, Some((640, 640))), (360, 640));
    }

    #[test]
    fn fit_within_never_upscales() {
        assert_eq!(fit_within(320, 240, Some((640, 480))), (320, 240));
        assert_eq!(fit_within(320, 240, None), (320, 240));
    }

    #[test]
    fn stream_time_uses_time_base() {
        let time = stream_time(3, Rational::new(1001, 30000));
        assert_eq!(time, MediaTime::new(3003, 30000).unwrap());
    }

    fn seconds(value: f64) -> MediaTime {
        MediaTime::from_seconds(value, 600)
    }

    /// Run frames through a selector the way the decode loop does.
    fn displayed(frame_times: &[f64], target: f64) -> Option<f64> {
        let mut selector = DisplaySelector::new(seconds(target));
        for &time in frame_times {
            match selector.offer(seconds(time)) {
                Selection::Hold | Selection::Skip => {}
                Selection::ShowHeld => return selector.held().map(|t| t.as_seconds_f64()),
                Selection::ShowOffered => return Some(time),
            }
        }
        selector.held().map(|t| t.as_seconds_f64())
    }

    #[test]
    fn session_handles_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<PacketTimingReader>();
        assert_send::<DecodingFrameGenerator>();
    }

    #[test]
    fn selector_returns_frame_on_screen() {
        let frames = [0.0, 0.5, 1.0, 1.5];
        // Between frames: the earlier one is still displayed.
        assert_eq!(displayed(&frames, 0.7), Some(0.5));
        assert_eq!(displayed(&frames, 1.0), Some(1.0));
        assert_eq!(displayed(&frames, 0.99), Some(0.5));
    }

    #[test]
    fn selector_edges() {
        let frames = [0.5, 1.0];
        // Before the first frame, the first frame is shown.
        assert_eq!(displayed(&frames, 0.2), Some(0.5));
        // Past the last frame, the last frame stays on screen.
        assert_eq!(displayed(&frames, 9.0), Some(1.0));
        assert_eq!(displayed(&[], 1.0), None);
    }

    #[test]
    fn selector_ignores_late_older_frames() {
        assert_eq!(displayed(&[0.0, 0.8, 0.4, 1.2], 1.0), Some(0.8));
    }

    #[test]
    fn log_level_names() {
        assert_eq!(FfmpegLogLevel::from_name("WARN"), Some(FfmpegLogLevel::Warning));
        assert_eq!(FfmpegLogLevel::from_name("loud"), None);
    }
}
