//! Video collaborator interfaces.
//!
//! The indexer and the export engine never touch a demuxer or decoder
//! directly. They work against [`VideoSource`], which hands out two kinds of
//! session:
//!
//! - a [`SampleTimingReader`] that yields the timing metadata of every sample
//!   in a track, one buffered batch at a time, without decoding pixels;
//! - a [`FrameGenerator`] that decodes a still image at a requested time.
//!
//! The `ffmpeg` feature provides [`FfmpegVideo`](crate::ffmpeg::FfmpegVideo);
//! tests and embedders can supply their own implementations.

use image::DynamicImage;

use crate::error::StillframeError;
use crate::sample_timing::SampleTiming;
use crate::time::MediaTime;

/// Kind of media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Video samples.
    Video,
    /// Audio samples.
    Audio,
    /// Anything else (subtitles, data, attachments).
    Other,
}

/// Description of one track in a video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    /// Index of the track within its container.
    pub index: usize,
    /// Media kind.
    pub kind: TrackKind,
    /// Ticks per second of the track's timestamps.
    pub timescale: i32,
    /// Whether a decoder is available for the track's codec.
    pub decodable: bool,
    /// Frame width in pixels (0 for non-video tracks).
    pub width: u32,
    /// Frame height in pixels (0 for non-video tracks).
    pub height: u32,
}

/// How a [`SampleTimingReader`] finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStatus {
    /// Still reading, or reached the end cleanly.
    Completed,
    /// The host environment suspended decoding (e.g. the app was
    /// backgrounded). Retrying later may succeed.
    Interrupted,
    /// Reading failed for another reason.
    Failed(String),
}

/// A sequential, read-only session over one track's sample timings.
pub trait SampleTimingReader: Send {
    /// Pull the next buffered batch of timings.
    ///
    /// Returns `None` once the source is exhausted, whether cleanly or not;
    /// [`status`](SampleTimingReader::status) tells which.
    fn next_batch(&mut self) -> Option<Vec<SampleTiming>>;

    /// Completion status. Only meaningful after `next_batch` returned `None`.
    fn status(&self) -> ReadStatus;
}

/// A still image decoded at a requested time.
#[derive(Debug, Clone)]
pub struct GeneratedFrame {
    /// The decoded image, already limited to the session's maximum size.
    pub image: DynamicImage,
    /// The time that was asked for.
    pub requested_time: MediaTime,
    /// Presentation time of the frame actually decoded.
    pub actual_time: MediaTime,
}

/// A request-based still image generation session.
///
/// One session is reused for every frame of an export run.
pub trait FrameGenerator: Send {
    /// Decode the frame displayed at `time`.
    fn generate(&mut self, time: MediaTime) -> Result<GeneratedFrame, StillframeError>;
}

/// A video that can be indexed and have frames extracted from it.
pub trait VideoSource: Send + Sync {
    /// Enumerate the tracks in the video.
    fn tracks(&self) -> Result<Vec<TrackInfo>, StillframeError>;

    /// Open a timing reader scoped to `track`.
    fn sample_timing_reader(
        &self,
        track: &TrackInfo,
    ) -> Result<Box<dyn SampleTimingReader>, StillframeError>;

    /// Open a frame generation session whose output fits in `max_size`
    /// (`None` keeps the source resolution).
    fn frame_generator(
        &self,
        max_size: Option<(u32, u32)>,
    ) -> Result<Box<dyn FrameGenerator>, StillframeError>;

    /// The first decodable video track, if any.
    fn primary_video_track(&self) -> Result<Option<TrackInfo>, StillframeError> {
        Ok(self
            .tracks()?
            .into_iter()
            .find(|track| track.kind == TrackKind::Video && track.decodable))
    }
}
