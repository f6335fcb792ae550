//! # stillframe
//!
//! Frame-accurate timing and still frame export for video files.
//!
//! `stillframe` provides the processing core behind a frame grabber:
//!
//! - a **sample time indexer** that reads the presentation time and duration
//!   of every sample in a video track on a background thread and answers
//!   "which frame is shown at time T" in logarithmic time;
//! - a **frame export engine** that turns a list of requested times into
//!   encoded image files inside a fresh run directory, in bounded chunks,
//!   with all-or-nothing rollback on failure or cancellation;
//! - a **coalescing seek scheduler** that keeps scrubbing responsive by
//!   collapsing bursts of seek requests into at most two underlying seeks.
//!
//! Decoding is abstracted behind [`VideoSource`]. With the `ffmpeg` feature
//! enabled, [`FfmpegVideo`] implements it using
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next).
//!
//! ## Quick Start
//!
//! ### Snap a time to a frame
//!
//! ```no_run
//! # #[cfg(feature = "ffmpeg")]
//! # fn example() -> Result<(), stillframe::StillframeError> {
//! use std::sync::Arc;
//!
//! use stillframe::{FfmpegVideo, IndexingOptions, MediaTime, SampleTimeIndexer};
//!
//! let video = Arc::new(FfmpegVideo::open("input.mp4")?);
//! let indexer = SampleTimeIndexer::new();
//! indexer.start_indexing(video, IndexingOptions::new())?.wait()?;
//!
//! let sample = indexer.nearest_sample_timing(MediaTime::from_seconds(1.234, 1000));
//! # Ok(())
//! # }
//! ```
//!
//! ### Export frames
//!
//! ```no_run
//! # #[cfg(feature = "ffmpeg")]
//! # fn example() -> Result<(), stillframe::StillframeError> {
//! use std::sync::Arc;
//!
//! use stillframe::{ExportOptions, FfmpegVideo, FrameExportEngine, FrameExportRequest, MediaTime};
//!
//! let video = Arc::new(FfmpegVideo::open("input.mp4")?);
//! let request = FrameExportRequest::new(video, vec![MediaTime::from_seconds(4.0, 600)])
//!     .with_output_directory("out");
//! let outcome = FrameExportEngine::new().start(request, ExportOptions::new())?.wait();
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Rational time**: [`MediaTime`] compares exactly across timescales
//! - **Retry by restart**: [`RetryPolicy`] restarts failed indexing from
//!   scratch
//! - **Progress & cancellation**: cooperative callbacks and
//!   [`CancellationToken`] for long-running operations
//! - **Async or blocking**: indexing tasks are futures, export runs are
//!   streams, and both have blocking `wait` methods
//! - **Pluggable I/O**: [`Storage`] and [`ImageEncoder`] can be replaced
//!
//! ## Feature flags
//!
//! | Feature  | Description |
//! |----------|-------------|
//! | `ffmpeg` | FFmpeg-backed [`VideoSource`] and the `stillframe` CLI |
//! | `full`   | Enables every optional feature |

pub mod configuration;
pub mod encoding;
pub mod error;
pub mod export;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod indexer;
pub mod media;
pub mod progress;
pub mod sample_timing;
pub mod search;
pub mod seek;
pub mod storage;
pub mod time;

pub use configuration::{ExportOptions, IndexingOptions, RetryPolicy, RetryPredicate};
pub use encoding::{EncodingSpec, ImageCrateEncoder, ImageEncoder, OutputFormat};
pub use error::{ErrorKind, StillframeError};
pub use export::{
    DEFAULT_CHUNK_SIZE, ExportHandle, ExportOutcome, ExportRun, FrameExportEngine,
    FrameExportRequest, frame_file_name,
};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{FfmpegLogLevel, FfmpegVideo, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use indexer::{IndexingState, IndexingTask, SampleTimeIndexer, index_sample_timings};
pub use media::{
    FrameGenerator, GeneratedFrame, ReadStatus, SampleTimingReader, TrackInfo, TrackKind,
    VideoSource,
};
pub use progress::{CancellationToken, OperationType, ProgressCallback, ProgressInfo};
pub use sample_timing::{SampleTiming, SampleTimingTable};
pub use search::SortedSearch;
pub use seek::{
    PlaybackResource, SeekCompletion, SeekDriver, SeekEffect, SeekEvent, SeekId, SeekIntent,
    SeekScheduler, SeekState,
};
pub use storage::{FileSystemStorage, Storage};
pub use time::{MediaTime, RoundingMethod};
