//! Chunked still frame export.
//!
//! [`FrameExportEngine`] turns a list of requested times into one image file
//! per time inside a fresh, uniquely named run directory. Requested times are
//! split into chunks of at most `chunk_size` and processed strictly one after
//! another against a single [`FrameGenerator`](crate::FrameGenerator) session
//! on a background thread, so peak memory stays bounded while the decoder
//! session is reused across the whole run.
//!
//! Every per-frame result is folded into one [`ExportOutcome`] under a single
//! lock. The run observer receives zero or more
//! [`Progressed`](ExportOutcome::Progressed) snapshots followed by exactly one
//! terminal outcome. Any terminal outcome other than
//! [`Succeeded`](ExportOutcome::Succeeded) deletes the run directory.
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "ffmpeg")]
//! # fn example() -> Result<(), stillframe::StillframeError> {
//! use std::sync::Arc;
//!
//! use stillframe::{
//!     EncodingSpec, ExportOptions, ExportOutcome, FfmpegVideo, FrameExportEngine,
//!     FrameExportRequest, MediaTime, OutputFormat,
//! };
//!
//! let video = Arc::new(FfmpegVideo::open("input.mp4")?);
//! let times = vec![MediaTime::from_seconds(1.0, 600), MediaTime::from_seconds(2.5, 600)];
//! let request = FrameExportRequest::new(video, times)
//!     .with_encoding(EncodingSpec::new(OutputFormat::Jpeg))
//!     .with_chunk_size(4);
//!
//! let engine = FrameExportEngine::new();
//! match engine.start(request, ExportOptions::new())?.wait() {
//!     ExportOutcome::Succeeded(paths) => println!("wrote {} frames", paths.len()),
//!     other => println!("export ended with {other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::mem;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_stream::Stream;

use crate::configuration::ExportOptions;
use crate::encoding::{EncodingSpec, ImageCrateEncoder, ImageEncoder};
use crate::error::StillframeError;
use crate::media::{FrameGenerator, VideoSource};
use crate::progress::{CancellationToken, OperationType, ProgressTracker};
use crate::storage::{FileSystemStorage, Storage};
use crate::time::MediaTime;

/// Default number of requested times processed per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 8;

/// Name prefix of run directories.
const RUN_DIRECTORY_PREFIX: &str = "stillframe-export";

/// File stem shared by every exported frame.
const FRAME_FILE_STEM: &str = "frame";

/// File name for the frame at global output `index`: `frame.<ext>` for the
/// first frame and `frame-<index>.<ext>` after it.
pub fn frame_file_name(index: usize, extension: &str) -> String {
    if index == 0 {
        format!("{FRAME_FILE_STEM}.{extension}")
    } else {
        format!("{FRAME_FILE_STEM}-{index}.{extension}")
    }
}

/// What to export.
#[derive(Clone)]
#[must_use]
pub struct FrameExportRequest {
    /// Video to take frames from.
    pub video: Arc<dyn VideoSource>,
    /// Requested times, in output order. May be empty.
    pub times: Vec<MediaTime>,
    /// Image encoding of the output files.
    pub encoding: EncodingSpec,
    /// Parent of the run directory. `None` uses the system temp directory.
    pub output_directory: Option<PathBuf>,
    /// Maximum times per chunk. Must be at least 1.
    pub chunk_size: usize,
    /// Bounding box for generated frames. `None` keeps the source size.
    pub max_size: Option<(u32, u32)>,
}

impl Debug for FrameExportRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FrameExportRequest")
            .field("times", &self.times.len())
            .field("encoding", &self.encoding)
            .field("output_directory", &self.output_directory)
            .field("chunk_size", &self.chunk_size)
            .field("max_size", &self.max_size)
            .finish_non_exhaustive()
    }
}

impl FrameExportRequest {
    /// Export `times` from `video` as PNG files in default-sized chunks.
    pub fn new(video: Arc<dyn VideoSource>, times: Vec<MediaTime>) -> Self {
        Self {
            video,
            times,
            encoding: EncodingSpec::default(),
            output_directory: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_size: None,
        }
    }

    /// Set the output encoding.
    pub fn with_encoding(mut self, encoding: EncodingSpec) -> Self {
        self.encoding = encoding;
        self
    }

    /// Create the run directory under `parent`.
    pub fn with_output_directory<P: Into<PathBuf>>(mut self, parent: P) -> Self {
        self.output_directory = Some(parent.into());
        self
    }

    /// Set the chunk size. Zero is rejected by [`FrameExportEngine::start`].
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Limit generated frames to fit within `width` × `height`.
    pub fn with_max_size(mut self, width: u32, height: u32) -> Self {
        self.max_size = Some((width, height));
        self
    }
}

/// State of an export run as seen by observers.
#[derive(Debug, Clone)]
pub enum ExportOutcome {
    /// Frames written so far, in output order.
    Progressed(Vec<PathBuf>),
    /// Every requested frame was written; paths in output order.
    Succeeded(Vec<PathBuf>),
    /// The run was cancelled and its output rolled back.
    Cancelled,
    /// The run failed and its output was rolled back.
    Failed(Arc<StillframeError>),
}

impl ExportOutcome {
    /// Returns `true` for every outcome except `Progressed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExportOutcome::Progressed(_))
    }

    /// Paths written so far (empty for `Cancelled` and `Failed`).
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            ExportOutcome::Progressed(paths) | ExportOutcome::Succeeded(paths) => paths.as_slice(),
            ExportOutcome::Cancelled | ExportOutcome::Failed(_) => &[],
        }
    }
}

/// Per-frame result fed to the aggregator.
#[derive(Debug)]
pub(crate) enum FrameEvent {
    Written(PathBuf),
    Failed(StillframeError),
    Cancelled,
}

/// Side effects requested by an aggregation step, performed in order while
/// the aggregate is still locked.
#[derive(Debug)]
pub(crate) enum ExportEffect {
    Emit(ExportOutcome),
    Rollback,
    CancelTasks,
}

/// The run's authoritative outcome.
#[derive(Debug, Clone)]
pub(crate) enum ExportState {
    Running { written: Vec<PathBuf>, total: usize },
    Succeeded(Vec<PathBuf>),
    Cancelled,
    Failed(Arc<StillframeError>),
}

impl ExportState {
    pub(crate) fn new(total: usize) -> Self {
        ExportState::Running {
            written: Vec::with_capacity(total),
            total,
        }
    }

    pub(crate) fn is_terminal(&self) -> bool {
        !matches!(self, ExportState::Running { .. })
    }

    pub(crate) fn snapshot(&self) -> ExportOutcome {
        match self {
            ExportState::Running { written, .. } => ExportOutcome::Progressed(written.clone()),
            ExportState::Succeeded(paths) => ExportOutcome::Succeeded(paths.clone()),
            ExportState::Cancelled => ExportOutcome::Cancelled,
            ExportState::Failed(error) => ExportOutcome::Failed(Arc::clone(error)),
        }
    }

    /// Fold one frame event into the state.
    ///
    /// The first terminal transition wins; events arriving afterwards are
    /// ignored. Any event reported after cancellation was requested counts
    /// as a cancellation, so the run never succeeds once cancelled.
    pub(crate) fn apply(
        self,
        event: FrameEvent,
        cancel_requested: bool,
    ) -> (ExportState, Vec<ExportEffect>) {
        let (mut written, total) = match self {
            ExportState::Running { written, total } => (written, total),
            terminal => return (terminal, Vec::new()),
        };

        match event {
            _ if cancel_requested => Self::abort(ExportState::Cancelled, ExportOutcome::Cancelled),
            FrameEvent::Cancelled => Self::abort(ExportState::Cancelled, ExportOutcome::Cancelled),
            FrameEvent::Failed(error) => {
                let error = Arc::new(error);
                Self::abort(
                    ExportState::Failed(Arc::clone(&error)),
                    ExportOutcome::Failed(error),
                )
            }
            FrameEvent::Written(path) => {
                written.push(path);
                if written.len() >= total {
                    let effects = vec![ExportEffect::Emit(ExportOutcome::Succeeded(written.clone()))];
                    (ExportState::Succeeded(written), effects)
                } else {
                    let effects = vec![ExportEffect::Emit(ExportOutcome::Progressed(written.clone()))];
                    (ExportState::Running { written, total }, effects)
                }
            }
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ExportState::Running { .. } => "running",
            ExportState::Succeeded(_) => "succeeded",
            ExportState::Cancelled => "cancelled",
            ExportState::Failed(_) => "failed",
        }
    }

    fn abort(state: ExportState, outcome: ExportOutcome) -> (ExportState, Vec<ExportEffect>) {
        (
            state,
            vec![
                ExportEffect::CancelTasks,
                ExportEffect::Rollback,
                ExportEffect::Emit(outcome),
            ],
        )
    }
}

struct Aggregate {
    state: ExportState,
    directory: Option<PathBuf>,
    sender: Option<UnboundedSender<ExportOutcome>>,
    worker_running: bool,
    deferred: Option<ExportOutcome>,
}

impl Aggregate {
    fn deliver_terminal(&mut self, outcome: ExportOutcome) {
        if let Some(sender) = self.sender.take() {
            // The observer may have gone away; the run continues regardless.
            let _ = sender.send(outcome);
        }
    }
}

/// State shared between the worker, the observer, and any canceller.
struct RunShared {
    aggregate: Mutex<Aggregate>,
    token: CancellationToken,
    external: Option<CancellationToken>,
    storage: Arc<dyn Storage>,
}

impl RunShared {
    fn is_cancel_requested(&self) -> bool {
        self.token.is_cancelled()
            || self
                .external
                .as_ref()
                .is_some_and(|external| external.is_cancelled())
    }

    fn lock(&self) -> MutexGuard<'_, Aggregate> {
        self.aggregate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The single critical section in which the outcome changes.
    fn report(&self, event: FrameEvent) {
        let cancel_requested = self.is_cancel_requested();
        let mut aggregate = self.lock();
        let state = mem::replace(&mut aggregate.state, ExportState::Cancelled);
        let (state, effects) = state.apply(event, cancel_requested);
        aggregate.state = state;

        for effect in effects {
            match effect {
                ExportEffect::CancelTasks => self.token.cancel(),
                ExportEffect::Rollback => {
                    if let Some(directory) = aggregate.directory.as_deref() {
                        self.rollback(directory);
                    }
                }
                ExportEffect::Emit(outcome) if outcome.is_terminal() => {
                    log::info!("Export {}", aggregate.state.label());
                    if aggregate.worker_running {
                        // Sent by `finish` once the worker has stopped writing.
                        aggregate.deferred = Some(outcome);
                    } else {
                        aggregate.deliver_terminal(outcome);
                    }
                }
                ExportEffect::Emit(outcome) => {
                    if let Some(sender) = aggregate.sender.as_ref() {
                        let _ = sender.send(outcome);
                    }
                }
            }
        }
    }

    /// Rollback errors are logged and swallowed; the failure that triggered
    /// the rollback is what the caller sees.
    fn rollback(&self, directory: &Path) {
        log::debug!("Rolling back export directory {}", directory.display());
        if let Err(error) = self.storage.remove_directory(directory) {
            log::warn!(
                "Failed to remove export directory {}: {}",
                directory.display(),
                error
            );
        }
    }

    /// Runs on the worker after its last task. Repeats the rollback so a
    /// file written after an earlier rollback does not survive, then
    /// delivers the terminal outcome.
    fn finish(&self) {
        let mut aggregate = self.lock();
        aggregate.worker_running = false;
        let failed = matches!(
            aggregate.state,
            ExportState::Cancelled | ExportState::Failed(_)
        );
        if failed {
            if let Some(directory) = aggregate.directory.as_deref() {
                self.rollback(directory);
            }
        }
        if let Some(outcome) = aggregate.deferred.take() {
            aggregate.deliver_terminal(outcome);
        }
    }
}

/// A cloneable handle for cancelling and inspecting one export run.
#[derive(Clone)]
pub struct ExportHandle {
    shared: Arc<RunShared>,
}

impl Debug for ExportHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ExportHandle")
            .field("outcome", &self.outcome())
            .finish()
    }
}

impl ExportHandle {
    /// Cancel the run and roll back its output.
    ///
    /// May be called from any thread, any number of times. Has no effect
    /// once the run has reached a terminal outcome. The outcome flips to
    /// cancelled immediately, but observers receive
    /// [`ExportOutcome::Cancelled`] only after the worker has stopped and
    /// the run directory is gone.
    pub fn cancel(&self) {
        self.shared.token.cancel();
        self.shared.report(FrameEvent::Cancelled);
    }

    /// Snapshot of the run's current outcome.
    pub fn outcome(&self) -> ExportOutcome {
        self.shared.lock().state.snapshot()
    }

    /// Returns `true` once the outcome is terminal.
    pub fn is_finished(&self) -> bool {
        self.shared.lock().state.is_terminal()
    }

    /// The run directory, if one was created.
    pub fn output_directory(&self) -> Option<PathBuf> {
        self.shared.lock().directory.clone()
    }
}

/// An export run in progress.
///
/// Yields zero or more [`ExportOutcome::Progressed`] values followed by
/// exactly one terminal outcome, then ends. Consume it as a
/// [`tokio_stream::Stream`], or from synchronous code with
/// [`recv_blocking`](ExportRun::recv_blocking) and [`wait`](ExportRun::wait).
pub struct ExportRun {
    receiver: UnboundedReceiver<ExportOutcome>,
    handle: ExportHandle,
}

impl ExportRun {
    /// A handle that can cancel this run from elsewhere.
    pub fn handle(&self) -> ExportHandle {
        self.handle.clone()
    }

    /// Cancel the run. See [`ExportHandle::cancel`].
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Block until the next outcome. Returns `None` after the terminal
    /// outcome has been received.
    ///
    /// Must not be called from within an async runtime.
    pub fn recv_blocking(&mut self) -> Option<ExportOutcome> {
        self.receiver.blocking_recv()
    }

    /// Block until the run ends and return its terminal outcome.
    ///
    /// Must not be called from within an async runtime.
    pub fn wait(mut self) -> ExportOutcome {
        let mut last = None;
        while let Some(outcome) = self.receiver.blocking_recv() {
            last = Some(outcome);
        }
        last.filter(ExportOutcome::is_terminal)
            .unwrap_or_else(|| self.handle.outcome())
    }

    /// Wait asynchronously for the terminal outcome.
    pub async fn finished(mut self) -> ExportOutcome {
        let mut last = None;
        while let Some(outcome) = self.receiver.recv().await {
            last = Some(outcome);
        }
        last.filter(ExportOutcome::is_terminal)
            .unwrap_or_else(|| self.handle.outcome())
    }
}

impl Stream for ExportRun {
    type Item = ExportOutcome;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// A bounded sub-batch of requested times and the output index of its
/// first time.
#[derive(Debug, Clone)]
struct ExportTask {
    start_index: usize,
    times: Vec<MediaTime>,
}

fn partition_into_tasks(times: &[MediaTime], chunk_size: usize) -> Vec<ExportTask> {
    times
        .chunks(chunk_size)
        .enumerate()
        .map(|(chunk_index, chunk)| ExportTask {
            start_index: chunk_index * chunk_size,
            times: chunk.to_vec(),
        })
        .collect()
}

/// Runs frame export requests.
///
/// The engine keeps a handle to the most recently started run so
/// [`cancel`](FrameExportEngine::cancel) and
/// [`current_outcome`](FrameExportEngine::current_outcome) can reach it.
pub struct FrameExportEngine {
    storage: Arc<dyn Storage>,
    encoder: Arc<dyn ImageEncoder>,
    current: Mutex<Option<ExportHandle>>,
}

impl Default for FrameExportEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameExportEngine {
    /// An engine writing to the local file system with the `image` crate's
    /// encoders.
    pub fn new() -> Self {
        Self {
            storage: Arc::new(FileSystemStorage),
            encoder: Arc::new(ImageCrateEncoder),
            current: Mutex::new(None),
        }
    }

    /// Use a different storage backend.
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = storage;
        self
    }

    /// Use a different image encoder.
    #[must_use]
    pub fn with_encoder(mut self, encoder: Arc<dyn ImageEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Start exporting `request` on a background thread.
    ///
    /// A failure to create the run directory is reported as the run's
    /// terminal [`ExportOutcome::Failed`], with nothing written.
    ///
    /// # Errors
    ///
    /// Returns [`StillframeError::InvalidChunkSize`] if `chunk_size` is 0.
    pub fn start(
        &self,
        request: FrameExportRequest,
        options: ExportOptions,
    ) -> Result<ExportRun, StillframeError> {
        if request.chunk_size == 0 {
            return Err(StillframeError::InvalidChunkSize);
        }

        let total = request.times.len();
        let (sender, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(RunShared {
            aggregate: Mutex::new(Aggregate {
                state: ExportState::new(total),
                directory: None,
                sender: Some(sender),
                worker_running: false,
                deferred: None,
            }),
            token: CancellationToken::new(),
            external: options.cancellation.clone(),
            storage: Arc::clone(&self.storage),
        });
        let handle = ExportHandle {
            shared: Arc::clone(&shared),
        };
        *self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle.clone());

        log::info!(
            "Starting export of {} frame(s) in chunks of {}",
            total,
            request.chunk_size
        );

        if total == 0 {
            let mut aggregate = shared.lock();
            aggregate.state = ExportState::Succeeded(Vec::new());
            if let Some(sender) = aggregate.sender.take() {
                let _ = sender.send(ExportOutcome::Succeeded(Vec::new()));
            }
            drop(aggregate);
            return Ok(ExportRun { receiver, handle });
        }

        let parent = request
            .output_directory
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        match self
            .storage
            .create_unique_directory(&parent, RUN_DIRECTORY_PREFIX)
        {
            Ok(directory) => {
                log::debug!("Created export directory {}", directory.display());
                shared.lock().directory = Some(directory);
            }
            Err(error) => {
                shared.report(FrameEvent::Failed(StillframeError::DirectoryCreationFailed {
                    path: parent,
                    reason: error.to_string(),
                }));
                return Ok(ExportRun { receiver, handle });
            }
        }

        let worker = ExportWorker {
            shared: Arc::clone(&shared),
            encoder: Arc::clone(&self.encoder),
            request,
            options,
        };
        shared.lock().worker_running = true;
        let spawned = std::thread::Builder::new()
            .name("stillframe-export".to_string())
            .spawn(move || worker.run());
        if let Err(error) = spawned {
            shared.lock().worker_running = false;
            shared.report(FrameEvent::Failed(StillframeError::IoError(error)));
        }

        Ok(ExportRun { receiver, handle })
    }

    /// Cancel the most recently started run.
    pub fn cancel(&self) {
        let current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(handle) = current {
            handle.cancel();
        }
    }

    /// Snapshot of the most recently started run's outcome.
    pub fn current_outcome(&self) -> Option<ExportOutcome> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(ExportHandle::outcome)
    }
}

/// Everything the background thread needs for one run.
struct ExportWorker {
    shared: Arc<RunShared>,
    encoder: Arc<dyn ImageEncoder>,
    request: FrameExportRequest,
    options: ExportOptions,
}

impl ExportWorker {
    fn run(self) {
        self.run_tasks();
        self.shared.finish();
    }

    fn run_tasks(&self) {
        let Some(directory) = self.shared.lock().directory.clone() else {
            return;
        };

        let mut generator = match self.request.video.frame_generator(self.request.max_size) {
            Ok(generator) => generator,
            Err(error) => {
                let time = self.request.times.first().copied().unwrap_or(MediaTime::ZERO);
                self.shared.report(FrameEvent::Failed(
                    StillframeError::FrameGenerationFailed {
                        time,
                        reason: error.to_string(),
                    },
                ));
                return;
            }
        };

        let mut tracker = ProgressTracker::new(
            Arc::clone(&self.options.progress),
            OperationType::FrameExport,
            Some(self.request.times.len() as u64),
            self.options.batch_size,
        );

        let tasks = partition_into_tasks(&self.request.times, self.request.chunk_size);
        for task in &tasks {
            log::debug!(
                "Exporting chunk of {} frame(s) starting at index {}",
                task.times.len(),
                task.start_index
            );
            if !self.run_task(task, generator.as_mut(), &directory, &mut tracker) {
                break;
            }
        }
        if matches!(self.shared.lock().state, ExportState::Succeeded(_)) {
            tracker.finish();
        }
    }

    /// Returns `false` once the run has stopped.
    fn run_task(
        &self,
        task: &ExportTask,
        generator: &mut dyn FrameGenerator,
        directory: &Path,
        tracker: &mut ProgressTracker,
    ) -> bool {
        let extension = self.request.encoding.extension();

        for (offset, &time) in task.times.iter().enumerate() {
            if self.shared.is_cancel_requested() {
                self.shared.report(FrameEvent::Cancelled);
                return false;
            }

            let index = task.start_index + offset;
            let path = directory.join(frame_file_name(index, extension));
            let event = match self.export_frame(generator, time, &path) {
                Ok(()) => FrameEvent::Written(path),
                Err(error) => FrameEvent::Failed(error),
            };
            let written = matches!(event, FrameEvent::Written(_));
            self.shared.report(event);
            if written {
                tracker.advance(Some(time));
            }
            if self.shared.lock().state.is_terminal() {
                return false;
            }
        }
        true
    }

    fn export_frame(
        &self,
        generator: &mut dyn FrameGenerator,
        time: MediaTime,
        path: &Path,
    ) -> Result<(), StillframeError> {
        let frame = generator
            .generate(time)
            .map_err(|error| StillframeError::FrameGenerationFailed {
                time,
                reason: error.to_string(),
            })?;
        let bytes = self
            .encoder
            .encode(&frame, &self.request.encoding)
            .map_err(|error| StillframeError::EncodingOrWriteFailed {
                time,
                reason: error.to_string(),
            })?;
        self.shared
            .storage
            .write_file(path, &bytes)
            .map_err(|error| StillframeError::EncodingOrWriteFailed {
                time,
                reason: error.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(name: &str) -> PathBuf {
        PathBuf::from(name)
    }

    #[test]
    fn file_names_follow_global_index() {
        assert_eq!(frame_file_name(0, "png"), "frame.png");
        assert_eq!(frame_file_name(1, "png"), "frame-1.png");
        assert_eq!(frame_file_name(12, "jpg"), "frame-12.jpg");
    }

    #[test]
    fn tasks_own_consecutive_index_ranges() {
        let times: Vec<MediaTime> = (0..7).map(|i| MediaTime::from_seconds(i as f64, 600)).collect();
        let tasks = partition_into_tasks(&times, 3);
        let starts: Vec<usize> = tasks.iter().map(|task| task.start_index).collect();
        let sizes: Vec<usize> = tasks.iter().map(|task| task.times.len()).collect();
        assert_eq!(starts, vec![0, 3, 6]);
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn writes_progress_then_succeed() {
        let state = ExportState::new(2);
        let (state, effects) = state.apply(FrameEvent::Written(path("a")), false);
        assert!(matches!(
            effects.as_slice(),
            [ExportEffect::Emit(ExportOutcome::Progressed(paths))] if paths.len() == 1
        ));
        let (state, effects) = state.apply(FrameEvent::Written(path("b")), false);
        assert!(matches!(
            effects.as_slice(),
            [ExportEffect::Emit(ExportOutcome::Succeeded(paths))] if paths.len() == 2
        ));
        assert!(state.is_terminal());
    }

    #[test]
    fn first_terminal_transition_wins() {
        let state = ExportState::new(3);
        let (state, effects) = state.apply(
            FrameEvent::Failed(StillframeError::Interrupted),
            false,
        );
        assert!(effects.iter().any(|effect| matches!(effect, ExportEffect::Rollback)));
        let (state, effects) = state.apply(FrameEvent::Cancelled, false);
        assert!(effects.is_empty());
        assert!(matches!(state, ExportState::Failed(_)));
    }

    #[test]
    fn write_after_cancel_request_counts_as_cancelled() {
        let state = ExportState::new(1);
        let (state, effects) = state.apply(FrameEvent::Written(path("a")), true);
        assert!(matches!(state, ExportState::Cancelled));
        assert!(effects.iter().any(|effect| matches!(effect, ExportEffect::Rollback)));
        assert!(effects.iter().any(|effect| matches!(
            effect,
            ExportEffect::Emit(ExportOutcome::Cancelled)
        )));
    }
}
