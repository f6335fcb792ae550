//! Error types for the `stillframe` crate.
//!
//! This module defines [`StillframeError`], the unified error type returned by
//! all fallible operations in the crate, and [`ErrorKind`], the coarse
//! classification callers use to decide whether a failure is worth retrying.

use std::{io::Error as IoError, path::PathBuf};

use image::ImageError;
use thiserror::Error;

use crate::time::MediaTime;

/// Coarse classification of a [`StillframeError`].
///
/// User-facing code is expected to offer a retry for
/// [`Interrupted`](ErrorKind::Interrupted) and
/// [`ResourceFailure`](ErrorKind::ResourceFailure), and to surface
/// [`SampleLimitReached`](ErrorKind::SampleLimitReached) and
/// [`InvalidInput`](ErrorKind::InvalidInput) as final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The input cannot be processed (no decodable track, bad argument).
    InvalidInput,
    /// The host environment suspended decoding. Retryable.
    Interrupted,
    /// An underlying decode, generation, or storage operation failed.
    ResourceFailure,
    /// Indexing stopped because the track holds more samples than allowed.
    SampleLimitReached,
    /// The operation was cancelled. A normal terminal state, not a fault.
    Cancelled,
}

/// The unified error type for all `stillframe` operations.
///
/// Every public method that can fail returns `Result<T, StillframeError>`.
/// Variants carry enough context to diagnose the problem without needing
/// additional logging at the call site.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StillframeError {
    /// The video has no primary decodable video track.
    #[error("Invalid video: no decodable video track found")]
    InvalidVideo,

    /// A specific track was requested but does not exist.
    #[error("Video track {track_index} is out of range (video has {track_count} tracks)")]
    TrackNotFound {
        /// Requested track index.
        track_index: usize,
        /// Number of available video tracks.
        track_count: usize,
    },

    /// An export request was made with a chunk size of zero.
    #[error("Chunk size must be greater than zero")]
    InvalidChunkSize,

    /// A time value was constructed with a non-positive timescale.
    #[error("Invalid timescale: {0} (must be greater than zero)")]
    InvalidTimescale(i32),

    /// Decoding was suspended by the host environment.
    #[error("Sample reading was interrupted")]
    Interrupted,

    /// The sample timing reader reported a non-clean completion.
    #[error("Failed to read sample timings: {0}")]
    ReadingFailed(String),

    /// The track holds more samples than the configured limit.
    #[error("Sample limit of {limit} reached while indexing")]
    SampleLimitReached {
        /// The limit that was exceeded.
        limit: usize,
    },

    /// The output directory for an export run could not be created.
    #[error("Failed to create output directory under {path}: {reason}")]
    DirectoryCreationFailed {
        /// Parent directory the run directory was to be created in.
        path: PathBuf,
        /// Underlying reason the creation failed.
        reason: String,
    },

    /// The image generator could not produce a frame at `time`.
    #[error("Failed to generate frame at {time}: {reason}")]
    FrameGenerationFailed {
        /// Requested time of the frame.
        time: MediaTime,
        /// Underlying reason the generation failed.
        reason: String,
    },

    /// A generated frame could not be encoded or written to storage.
    #[error("Failed to encode or write frame at {time}: {reason}")]
    EncodingOrWriteFailed {
        /// Requested time of the frame.
        time: MediaTime,
        /// Underlying reason the encode or write failed.
        reason: String,
    },

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate during frame encoding.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// An error originating from the FFmpeg libraries.
    #[cfg(feature = "ffmpeg")]
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),
}

impl StillframeError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StillframeError::InvalidVideo
            | StillframeError::TrackNotFound { .. }
            | StillframeError::InvalidChunkSize
            | StillframeError::InvalidTimescale(_) => ErrorKind::InvalidInput,
            StillframeError::Interrupted => ErrorKind::Interrupted,
            StillframeError::SampleLimitReached { .. } => ErrorKind::SampleLimitReached,
            StillframeError::Cancelled => ErrorKind::Cancelled,
            StillframeError::ReadingFailed(_)
            | StillframeError::DirectoryCreationFailed { .. }
            | StillframeError::FrameGenerationFailed { .. }
            | StillframeError::EncodingOrWriteFailed { .. }
            | StillframeError::IoError(_)
            | StillframeError::ImageError(_) => ErrorKind::ResourceFailure,
            #[cfg(feature = "ffmpeg")]
            StillframeError::FfmpegError(_) => ErrorKind::ResourceFailure,
        }
    }

    /// Returns `true` if repeating the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Interrupted | ErrorKind::ResourceFailure
        )
    }

    /// Returns `true` for [`StillframeError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StillframeError::Cancelled)
    }
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Error> for StillframeError {
    fn from(error: ffmpeg_next::Error) -> Self {
        StillframeError::FfmpegError(error.to_string())
    }
}
