//! Background sample time indexing.
//!
//! [`SampleTimeIndexer`] reads the timing metadata of every sample in a
//! video's primary track on a worker thread and publishes the result as an
//! immutable [`SampleTimingTable`]. Once a table is published, playback times
//! can be snapped to actual frame times with
//! [`nearest_sample_timing`](SampleTimeIndexer::nearest_sample_timing).
//!
//! Each indexer runs at most one indexing pass at a time. Starting a new pass
//! cancels the active one, and the new worker joins the superseded worker
//! before it touches the video. The superseded pass still delivers its own
//! (cancelled) result to whoever holds its [`IndexingTask`].
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "ffmpeg")]
//! # fn example() -> Result<(), stillframe::StillframeError> {
//! use std::sync::Arc;
//!
//! use stillframe::{FfmpegVideo, IndexingOptions, MediaTime, RetryPolicy, SampleTimeIndexer};
//!
//! let video = Arc::new(FfmpegVideo::open("input.mp4")?);
//! let indexer = SampleTimeIndexer::new();
//! let options = IndexingOptions::new()
//!     .with_sample_limit(1_000_000)
//!     .with_retry_policy(RetryPolicy::Attempts(1));
//!
//! let table = indexer.start_indexing(video, options)?.wait()?;
//! println!("indexed {} samples", table.len());
//!
//! let frame = indexer.nearest_sample_timing(MediaTime::from_seconds(12.34, 1000));
//! println!("12.34s snaps to {:?}", frame.map(|sample| sample.presentation_time));
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::thread::JoinHandle;

use tokio::sync::oneshot::{self, Receiver};

use crate::configuration::IndexingOptions;
use crate::error::StillframeError;
use crate::media::{ReadStatus, VideoSource};
use crate::progress::{CancellationToken, OperationType, ProgressTracker};
use crate::sample_timing::{SampleTiming, SampleTimingTable};
use crate::time::MediaTime;

/// Lifecycle of an indexer: `Idle → Reading → {Completed | Failed | Cancelled}`.
#[derive(Debug, Clone)]
pub enum IndexingState {
    /// No pass has been started.
    Idle,
    /// A pass is running.
    Reading,
    /// The last pass produced this table.
    Completed(SampleTimingTable),
    /// The last pass failed and was not retried further.
    Failed(Arc<StillframeError>),
    /// The last pass was cancelled.
    Cancelled,
}

impl IndexingState {
    /// Returns `true` while a pass is running.
    pub fn is_reading(&self) -> bool {
        matches!(self, IndexingState::Reading)
    }
}

struct IndexerShared {
    state: IndexingState,
    generation: u64,
    active_token: Option<CancellationToken>,
    worker: Option<JoinHandle<()>>,
}

/// Builds and serves sample timing tables for one video at a time.
///
/// Queries are cheap and may be called from any thread; they read the most
/// recently published table.
pub struct SampleTimeIndexer {
    shared: Arc<Mutex<IndexerShared>>,
}

impl Default for SampleTimeIndexer {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleTimeIndexer {
    /// Create an idle indexer.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(IndexerShared {
                state: IndexingState::Idle,
                generation: 0,
                active_token: None,
                worker: None,
            })),
        }
    }

    /// Start indexing `video` on a background thread.
    ///
    /// Any pass already running on this indexer is cancelled first, and the
    /// new pass does not open a reader until the superseded worker has
    /// exited. The returned task resolves exactly once with the table or the
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns [`StillframeError::IoError`] if the worker thread cannot be
    /// spawned. Indexing failures are delivered through the task instead.
    pub fn start_indexing(
        &self,
        video: Arc<dyn VideoSource>,
        options: IndexingOptions,
    ) -> Result<IndexingTask, StillframeError> {
        let token = CancellationToken::new();
        let (sender, receiver) = oneshot::channel();

        // Held across the spawn so concurrent starts chain their workers.
        let mut guard = lock(&self.shared);
        if let Some(previous) = guard.active_token.take() {
            log::debug!("Cancelling superseded indexing pass {}", guard.generation);
            previous.cancel();
        }
        guard.generation += 1;
        guard.state = IndexingState::Reading;
        guard.active_token = Some(token.clone());
        let generation = guard.generation;
        let predecessor = guard.worker.take();

        let shared = Arc::clone(&self.shared);
        let worker_token = token.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("stillframe-indexer-{generation}"))
            .spawn(move || {
                if let Some(predecessor) = predecessor {
                    if predecessor.join().is_err() {
                        log::warn!("Superseded indexing worker panicked");
                    }
                }
                let result = if worker_token.is_cancelled() {
                    Err(StillframeError::Cancelled)
                } else {
                    index_with_retries(video.as_ref(), &options, &worker_token)
                };
                publish(&shared, generation, &result);
                // The task may have been dropped; nobody is waiting then.
                let _ = sender.send(result);
            });

        match spawned {
            Ok(handle) => guard.worker = Some(handle),
            Err(error) => {
                guard.active_token = None;
                guard.state = IndexingState::Failed(Arc::new(StillframeError::ReadingFailed(
                    format!("could not spawn indexing thread: {error}"),
                )));
                return Err(StillframeError::IoError(error));
            }
        }
        drop(guard);

        Ok(IndexingTask { receiver, token })
    }

    /// Cancel the running pass, if any.
    pub fn cancel(&self) {
        if let Some(token) = lock(&self.shared).active_token.as_ref() {
            token.cancel();
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> IndexingState {
        lock(&self.shared).state.clone()
    }

    /// The published table, if the last pass completed.
    pub fn table(&self) -> Option<SampleTimingTable> {
        match &lock(&self.shared).state {
            IndexingState::Completed(table) => Some(table.clone()),
            _ => None,
        }
    }

    /// See [`SampleTimingTable::nearest_sample_timing`]. Returns `None`
    /// while no table is published.
    pub fn nearest_sample_timing(&self, query: MediaTime) -> Option<SampleTiming> {
        self.table()?.nearest_sample_timing(query)
    }

    /// See [`SampleTimingTable::nearest_sample_index_within_second`].
    /// Returns `None` while no table is published.
    pub fn nearest_sample_index_within_second(&self, query: MediaTime) -> Option<usize> {
        self.table()?.nearest_sample_index_within_second(query)
    }
}

/// Handle to one indexing pass.
///
/// Await it, or call [`wait`](IndexingTask::wait) from synchronous code, to
/// receive the pass's single terminal result. Dropping the task does not
/// cancel the pass; call [`cancel`](IndexingTask::cancel) for that.
pub struct IndexingTask {
    receiver: Receiver<Result<SampleTimingTable, StillframeError>>,
    token: CancellationToken,
}

impl IndexingTask {
    /// Request cancellation. Observed before the next batch is read.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// A token that cancels this pass when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Block the current thread until the pass finishes.
    ///
    /// Must not be called from within an async runtime; await the task
    /// there instead.
    pub fn wait(self) -> Result<SampleTimingTable, StillframeError> {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(StillframeError::Cancelled))
    }
}

impl Future for IndexingTask {
    type Output = Result<SampleTimingTable, StillframeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(StillframeError::Cancelled)))
    }
}

/// Index `video` on the calling thread, restarting according to the
/// options' retry policy.
///
/// This is what [`SampleTimeIndexer::start_indexing`] runs on its worker.
/// Cancellation is observed through `token` and through any token in
/// `options`.
pub fn index_sample_timings(
    video: &dyn VideoSource,
    options: &IndexingOptions,
    token: &CancellationToken,
) -> Result<SampleTimingTable, StillframeError> {
    index_with_retries(video, options, token)
}

fn index_with_retries(
    video: &dyn VideoSource,
    options: &IndexingOptions,
    token: &CancellationToken,
) -> Result<SampleTimingTable, StillframeError> {
    let is_cancelled = || {
        token.is_cancelled()
            || options
                .cancellation
                .as_ref()
                .is_some_and(|external| external.is_cancelled())
    };

    let mut failed_attempts = 0_u32;
    loop {
        match read_all_samples(video, options, &is_cancelled) {
            Ok(table) => {
                log::info!("Indexed {} samples", table.len());
                return Ok(table);
            }
            Err(error) => {
                if is_cancelled() {
                    log::debug!("Indexing cancelled");
                    return Err(StillframeError::Cancelled);
                }
                failed_attempts += 1;
                if options.retry_policy.should_retry(&error, failed_attempts) {
                    log::info!(
                        "Indexing attempt {} failed ({}), restarting from scratch",
                        failed_attempts,
                        error
                    );
                    continue;
                }
                log::debug!("Indexing failed after {} attempt(s): {}", failed_attempts, error);
                return Err(error);
            }
        }
    }
}

/// One full pass over the primary track. No state survives between passes.
fn read_all_samples(
    video: &dyn VideoSource,
    options: &IndexingOptions,
    is_cancelled: &dyn Fn() -> bool,
) -> Result<SampleTimingTable, StillframeError> {
    let track = video
        .primary_video_track()?
        .ok_or(StillframeError::InvalidVideo)?;
    log::debug!(
        "Reading sample timings (track={}, timescale={})",
        track.index,
        track.timescale
    );

    let mut reader = video.sample_timing_reader(&track)?;
    let mut tracker = ProgressTracker::new(
        Arc::clone(&options.progress),
        OperationType::SampleIndexing,
        None,
        options.batch_size,
    );
    let mut samples: Vec<SampleTiming> = Vec::new();

    loop {
        if is_cancelled() {
            return Err(StillframeError::Cancelled);
        }
        let Some(batch) = reader.next_batch() else {
            break;
        };
        let last_time = batch.last().map(|sample| sample.presentation_time);
        let batch_len = batch.len() as u64;
        samples.extend(batch);

        if let Some(limit) = options.sample_limit {
            if samples.len() > limit {
                log::debug!("Sample limit {} exceeded", limit);
                return Err(StillframeError::SampleLimitReached { limit });
            }
        }
        tracker.advance_by(batch_len, last_time);
    }

    if is_cancelled() {
        return Err(StillframeError::Cancelled);
    }
    match reader.status() {
        ReadStatus::Completed => {
            tracker.finish();
            Ok(SampleTimingTable::with_track_timescale(samples, track.timescale))
        }
        ReadStatus::Interrupted => Err(StillframeError::Interrupted),
        ReadStatus::Failed(reason) => Err(StillframeError::ReadingFailed(reason)),
    }
}

fn publish(
    shared: &Mutex<IndexerShared>,
    generation: u64,
    result: &Result<SampleTimingTable, StillframeError>,
) {
    let mut shared = lock(shared);
    if shared.generation != generation {
        return;
    }
    shared.active_token = None;
    shared.state = match result {
        Ok(table) => IndexingState::Completed(table.clone()),
        Err(StillframeError::Cancelled) => IndexingState::Cancelled,
        Err(error) => IndexingState::Failed(Arc::new(clone_for_state(error))),
    };
}

/// `StillframeError` is not `Clone` (it wraps `io::Error`); the published
/// state keeps an equivalent description.
fn clone_for_state(error: &StillframeError) -> StillframeError {
    match error {
        StillframeError::InvalidVideo => StillframeError::InvalidVideo,
        StillframeError::Interrupted => StillframeError::Interrupted,
        StillframeError::SampleLimitReached { limit } => {
            StillframeError::SampleLimitReached { limit: *limit }
        }
        StillframeError::ReadingFailed(reason) => StillframeError::ReadingFailed(reason.clone()),
        StillframeError::TrackNotFound {
            track_index,
            track_count,
        } => StillframeError::TrackNotFound {
            track_index: *track_index,
            track_count: *track_count,
        },
        other => StillframeError::ReadingFailed(other.to_string()),
    }
}

fn lock(shared: &Mutex<IndexerShared>) -> MutexGuard<'_, IndexerShared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
