//! Coalescing seek scheduling against a single playback resource.
//!
//! Scrubbing produces far more "go to time T" requests than a player can
//! service. [`SeekScheduler`] keeps at most two intents: the seek currently
//! running on the resource and the one to run next. A new smooth request
//! overwrites the queued intent instead of appending, so a burst of requests
//! costs at most two underlying seeks and always ends on the last requested
//! time.
//!
//! All scheduling decisions live in [`SeekState::transition`], a pure
//! function from `(state, event)` to `(state, effects)`. The scheduler is the
//! driver: it feeds events in and performs the returned effects on the
//! resource. Completions may be signalled from any thread through
//! [`SeekCompletion`]; a bare [`SeekScheduler`] queues them on a channel and
//! applies them when its owner calls in again. [`SeekDriver`] moves the
//! scheduler onto its own thread and applies each completion as it arrives.
//!
//! # Example
//!
//! ```
//! use stillframe::{MediaTime, PlaybackResource, SeekCompletion, SeekIntent, SeekScheduler};
//!
//! struct Player {
//!     time: MediaTime,
//! }
//!
//! impl PlaybackResource for Player {
//!     fn current_time(&self) -> MediaTime {
//!         self.time
//!     }
//!     fn is_playing(&self) -> bool {
//!         false
//!     }
//!     fn pause(&mut self) {}
//!     fn seek(&mut self, intent: &SeekIntent, completion: SeekCompletion) {
//!         self.time = intent.target_time;
//!         completion.complete(true);
//!     }
//!     fn cancel_pending_seeks(&mut self) {}
//! }
//!
//! let mut scheduler = SeekScheduler::new(Player { time: MediaTime::ZERO });
//! scheduler.smoothly_seek(SeekIntent::exact(MediaTime::from_seconds(3.0, 600)));
//! scheduler.wait_until_idle_blocking();
//! assert_eq!(scheduler.resource().current_time(), MediaTime::from_seconds(3.0, 600));
//! ```

use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::StillframeError;
use crate::sample_timing::SampleTimingTable;
use crate::time::MediaTime;

/// Identifier of one underlying seek started by a scheduler.
pub type SeekId = u64;

/// A request to move the playback position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekIntent {
    /// Where to go.
    pub target_time: MediaTime,
    /// How far before the target the resource may land.
    pub tolerance_before: MediaTime,
    /// How far after the target the resource may land.
    pub tolerance_after: MediaTime,
}

impl SeekIntent {
    /// An intent with explicit tolerances.
    pub fn new(
        target_time: MediaTime,
        tolerance_before: MediaTime,
        tolerance_after: MediaTime,
    ) -> Self {
        Self {
            target_time,
            tolerance_before,
            tolerance_after,
        }
    }

    /// A frame-exact intent (zero tolerance on both sides).
    pub fn exact(target_time: MediaTime) -> Self {
        Self::new(target_time, MediaTime::ZERO, MediaTime::ZERO)
    }

    /// This intent with each tolerance widened to at least the given value.
    #[must_use]
    pub fn relaxed(self, tolerance_before: MediaTime, tolerance_after: MediaTime) -> Self {
        Self {
            target_time: self.target_time,
            tolerance_before: self.tolerance_before.max(tolerance_before),
            tolerance_after: self.tolerance_after.max(tolerance_after),
        }
    }
}

/// One-shot completion signal for an underlying seek.
///
/// Hand it back with [`complete`](SeekCompletion::complete) from any thread.
/// Dropping it without completing reports an unfinished seek.
#[derive(Debug)]
pub struct SeekCompletion {
    id: SeekId,
    sender: Option<UnboundedSender<(SeekId, bool)>>,
}

impl SeekCompletion {
    /// The seek this completion belongs to.
    pub fn id(&self) -> SeekId {
        self.id
    }

    /// Report that the seek ended. `finished` is `false` when it was
    /// cancelled or interrupted before reaching the target.
    pub fn complete(mut self, finished: bool) {
        self.send(finished);
    }

    fn send(&mut self, finished: bool) {
        if let Some(sender) = self.sender.take() {
            // The scheduler may already be gone.
            let _ = sender.send((self.id, finished));
        }
    }
}

impl Drop for SeekCompletion {
    fn drop(&mut self) {
        self.send(false);
    }
}

/// The player or decoder a [`SeekScheduler`] drives.
pub trait PlaybackResource: Send {
    /// Current playback position.
    fn current_time(&self) -> MediaTime;

    /// Whether playback is running.
    fn is_playing(&self) -> bool;

    /// Pause playback.
    fn pause(&mut self);

    /// Start an asynchronous seek. Signal `completion` once it ends, from
    /// any thread, including synchronously from within this call.
    fn seek(&mut self, intent: &SeekIntent, completion: SeekCompletion);

    /// Abort every seek in progress. Their completions should be signalled
    /// with `finished == false`.
    fn cancel_pending_seeks(&mut self);
}

/// Input to [`SeekState::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekEvent {
    /// Coalescing request. `resource_time` is the resource's position when
    /// the request was made.
    Smooth {
        intent: SeekIntent,
        resource_time: MediaTime,
    },
    /// Cancel everything and start `intent` immediately.
    Direct(SeekIntent),
    /// The underlying seek `id` ended.
    Completed { id: SeekId, finished: bool },
    /// Drop the running and the queued intent.
    CancelPending,
    /// Replace the running seek with one to the latest target using at
    /// least these tolerances.
    Relax {
        tolerance_before: MediaTime,
        tolerance_after: MediaTime,
    },
}

/// Work a transition asks the driver to perform, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekEffect {
    /// Pause the resource if it is playing.
    PauseIfPlaying,
    /// Start an underlying seek.
    Start { id: SeekId, intent: SeekIntent },
    /// Abort the underlying seek in progress.
    CancelInFlight,
}

/// Scheduling state: the running intent and the queued one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeekState {
    current: Option<(SeekId, SeekIntent)>,
    next: Option<SeekIntent>,
    next_id: SeekId,
}

impl Default for SeekState {
    fn default() -> Self {
        Self {
            current: None,
            next: None,
            next_id: 1,
        }
    }
}

impl SeekState {
    /// Returns `true` while an underlying seek is running.
    pub fn is_seeking(&self) -> bool {
        self.current.is_some()
    }

    /// The running intent and its id.
    pub fn running(&self) -> Option<(SeekId, SeekIntent)> {
        self.current
    }

    /// The queued intent.
    pub fn queued(&self) -> Option<SeekIntent> {
        self.next
    }

    /// The time the resource will end up at once idle: the queued target,
    /// else the running one.
    pub fn target_time(&self) -> Option<MediaTime> {
        self.next
            .or(self.current.map(|(_, intent)| intent))
            .map(|intent| intent.target_time)
    }

    /// Apply `event`, returning the new state and the effects to perform.
    pub fn transition(mut self, event: SeekEvent) -> (SeekState, Vec<SeekEffect>) {
        let mut effects = Vec::new();
        match event {
            SeekEvent::Smooth {
                intent,
                resource_time,
            } => {
                let reference = self.target_time().unwrap_or(resource_time);
                if intent.target_time == reference {
                    return (self, effects);
                }
                self.next = Some(intent);
                if self.current.is_none() {
                    self.promote(&mut effects);
                }
            }
            SeekEvent::Direct(intent) => {
                if self.current.is_some() {
                    effects.push(SeekEffect::CancelInFlight);
                }
                self.next = Some(intent);
                self.promote(&mut effects);
            }
            SeekEvent::Completed { id, .. } => {
                if self.current.is_some_and(|(current_id, _)| current_id == id) {
                    self.current = None;
                    if self.next.is_some() {
                        self.promote(&mut effects);
                    }
                }
            }
            SeekEvent::CancelPending => {
                if self.current.is_some() {
                    effects.push(SeekEffect::CancelInFlight);
                }
                self.current = None;
                self.next = None;
            }
            SeekEvent::Relax {
                tolerance_before,
                tolerance_after,
            } => {
                let Some((_, running)) = self.current else {
                    return (self, effects);
                };
                let latest = self.next.take().unwrap_or(running);
                self.next = Some(latest.relaxed(tolerance_before, tolerance_after));
                effects.push(SeekEffect::CancelInFlight);
                self.promote(&mut effects);
            }
        }
        (self, effects)
    }

    fn promote(&mut self, effects: &mut Vec<SeekEffect>) {
        if let Some(intent) = self.next.take() {
            let id = self.next_id;
            self.next_id += 1;
            self.current = Some((id, intent));
            effects.push(SeekEffect::PauseIfPlaying);
            effects.push(SeekEffect::Start { id, intent });
        }
    }
}

/// Drives a [`PlaybackResource`] through coalesced seeks.
///
/// Requests are expected from one logical owner. Completions from the
/// resource are applied on the next call to any request method, to
/// [`process_completions`](SeekScheduler::process_completions), or while
/// waiting for idle. Use [`SeekDriver`] when nothing will call back in.
pub struct SeekScheduler<R: PlaybackResource> {
    resource: R,
    state: SeekState,
    sender: UnboundedSender<(SeekId, bool)>,
    receiver: UnboundedReceiver<(SeekId, bool)>,
    issued: u64,
}

impl<R: PlaybackResource> SeekScheduler<R> {
    /// Create an idle scheduler owning `resource`.
    pub fn new(resource: R) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            resource,
            state: SeekState::default(),
            sender,
            receiver,
            issued: 0,
        }
    }

    /// The driven resource.
    pub fn resource(&self) -> &R {
        &self.resource
    }

    /// Mutable access to the driven resource.
    pub fn resource_mut(&mut self) -> &mut R {
        &mut self.resource
    }

    /// Give back the resource, abandoning any scheduled seek.
    pub fn into_resource(self) -> R {
        self.resource
    }

    /// Returns `true` while an underlying seek is running.
    pub fn is_seeking(&self) -> bool {
        self.state.is_seeking()
    }

    /// Where the resource will be once idle, if a seek is scheduled.
    pub fn target_time(&self) -> Option<MediaTime> {
        self.state.target_time()
    }

    /// Scheduling state snapshot.
    pub fn state(&self) -> &SeekState {
        &self.state
    }

    /// Number of underlying seeks started so far.
    pub fn seeks_issued(&self) -> u64 {
        self.issued
    }

    /// Seek to `intent` without piling up work: waits for the running seek
    /// and replaces any queued intent. Requests for the time the resource is
    /// already headed to are ignored.
    pub fn smoothly_seek(&mut self, intent: SeekIntent) {
        self.process_completions();
        let resource_time = self.resource.current_time();
        self.apply(SeekEvent::Smooth {
            intent,
            resource_time,
        });
    }

    /// Cancel any running or queued seek and start `intent` now.
    pub fn directly_seek(&mut self, intent: SeekIntent) {
        self.process_completions();
        self.apply(SeekEvent::Direct(intent));
    }

    /// Cancel the running seek and forget the queued one.
    pub fn cancel_pending(&mut self) {
        self.process_completions();
        self.apply(SeekEvent::CancelPending);
    }

    /// Finish an unfinished scrub sooner by restarting the seek to the
    /// latest target with wider tolerances. Does nothing while idle.
    pub fn relax_pending_seek(&mut self, tolerance_before: MediaTime, tolerance_after: MediaTime) {
        self.process_completions();
        self.apply(SeekEvent::Relax {
            tolerance_before,
            tolerance_after,
        });
    }

    /// Move one frame forward or backward from where the resource is headed.
    ///
    /// A running scrub is relaxed to the length of the destination frame,
    /// then a frame-exact seek to the adjacent sample is scheduled. Returns
    /// the destination, or `None` at either end of the table.
    pub fn step_by_frame(&mut self, table: &SampleTimingTable, forward: bool) -> Option<MediaTime> {
        self.process_completions();
        let base = self
            .state
            .target_time()
            .unwrap_or_else(|| self.resource.current_time());
        let sample = if forward {
            table.sample_after(base)?
        } else {
            table.sample_before(base)?
        };
        self.relax_pending_seek(sample.duration, sample.duration);
        self.smoothly_seek(SeekIntent::exact(sample.presentation_time));
        Some(sample.presentation_time)
    }

    /// Apply every completion received so far. Returns how many were
    /// applied, stale ones included.
    pub fn process_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Ok((id, finished)) = self.receiver.try_recv() {
            self.complete(id, finished);
            applied += 1;
        }
        applied
    }

    /// Wait until no seek is running or queued.
    pub async fn wait_until_idle(&mut self) {
        self.process_completions();
        while self.state.is_seeking() {
            match self.receiver.recv().await {
                Some((id, finished)) => self.complete(id, finished),
                None => break,
            }
        }
    }

    /// Blocking version of [`wait_until_idle`](SeekScheduler::wait_until_idle).
    ///
    /// Must not be called from within an async runtime.
    pub fn wait_until_idle_blocking(&mut self) {
        self.process_completions();
        while self.state.is_seeking() {
            match self.receiver.blocking_recv() {
                Some((id, finished)) => self.complete(id, finished),
                None => break,
            }
        }
    }

    fn complete(&mut self, id: SeekId, finished: bool) {
        log::debug!("Seek {} completed (finished={})", id, finished);
        self.apply(SeekEvent::Completed { id, finished });
    }

    fn apply(&mut self, event: SeekEvent) {
        let state = mem::take(&mut self.state);
        let (state, effects) = state.transition(event);
        self.state = state;

        for effect in effects {
            match effect {
                SeekEffect::PauseIfPlaying => {
                    if self.resource.is_playing() {
                        self.resource.pause();
                    }
                }
                SeekEffect::CancelInFlight => {
                    log::debug!("Cancelling in-flight seek");
                    self.resource.cancel_pending_seeks();
                }
                SeekEffect::Start { id, intent } => {
                    log::debug!("Starting seek {} to {}", id, intent.target_time);
                    self.issued += 1;
                    let completion = SeekCompletion {
                        id,
                        sender: Some(self.sender.clone()),
                    };
                    self.resource.seek(&intent, completion);
                }
            }
        }
    }
}

type ResourceCall<R> = Box<dyn FnOnce(&mut R) + Send>;

/// Requests forwarded from a [`SeekDriver`] to its thread.
enum DriverCommand<R> {
    Smooth(SeekIntent),
    Direct(SeekIntent),
    CancelPending,
    Relax {
        tolerance_before: MediaTime,
        tolerance_after: MediaTime,
    },
    Step {
        table: SampleTimingTable,
        forward: bool,
        reply: std_mpsc::Sender<Option<MediaTime>>,
    },
    WithResource(ResourceCall<R>),
}

#[derive(Debug, Default)]
struct DriverStatus {
    state: SeekState,
    issued: u64,
    handled: u64,
    stopped: bool,
}

#[derive(Default)]
struct StatusBoard {
    status: Mutex<DriverStatus>,
    changed: Condvar,
}

impl StatusBoard {
    fn lock(&self) -> MutexGuard<'_, DriverStatus> {
        self.status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish<R: PlaybackResource>(&self, scheduler: &SeekScheduler<R>, handled: u64) {
        let mut status = self.lock();
        status.state = scheduler.state.clone();
        status.issued = scheduler.issued;
        status.handled = handled;
        drop(status);
        self.changed.notify_all();
    }

    /// Wait until `sent` requests have been handled or the driver is gone.
    fn settled(&self, sent: u64) -> MutexGuard<'_, DriverStatus> {
        let status = self.lock();
        self.changed
            .wait_while(status, |status| !status.stopped && status.handled < sent)
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Marks the board stopped when the driver thread exits, panics included.
struct StopGuard(Arc<StatusBoard>);

impl Drop for StopGuard {
    fn drop(&mut self) {
        self.0.lock().stopped = true;
        self.0.changed.notify_all();
    }
}

/// A [`SeekScheduler`] running on its own thread.
///
/// Completions are applied the moment the resource signals them, so a
/// queued intent starts even if nobody calls into the driver again. Request
/// methods take `&self` and return immediately; the getters report the state
/// after every request sent so far has been handled.
///
/// ```
/// use std::time::Duration;
///
/// use stillframe::{MediaTime, PlaybackResource, SeekCompletion, SeekDriver, SeekIntent};
///
/// struct Player {
///     time: MediaTime,
/// }
///
/// impl PlaybackResource for Player {
///     fn current_time(&self) -> MediaTime {
///         self.time
///     }
///     fn is_playing(&self) -> bool {
///         false
///     }
///     fn pause(&mut self) {}
///     fn seek(&mut self, intent: &SeekIntent, completion: SeekCompletion) {
///         self.time = intent.target_time;
///         std::thread::spawn(move || completion.complete(true));
///     }
///     fn cancel_pending_seeks(&mut self) {}
/// }
///
/// let driver = SeekDriver::spawn(Player { time: MediaTime::ZERO })?;
/// driver.smoothly_seek(SeekIntent::exact(MediaTime::from_seconds(1.0, 600)));
/// driver.smoothly_seek(SeekIntent::exact(MediaTime::from_seconds(2.0, 600)));
/// assert!(driver.wait_until_idle(Duration::from_secs(5)));
/// assert_eq!(driver.with_resource(|player| player.time), Some(MediaTime::from_seconds(2.0, 600)));
/// # Ok::<(), stillframe::StillframeError>(())
/// ```
pub struct SeekDriver<R: PlaybackResource + 'static> {
    commands: Option<UnboundedSender<DriverCommand<R>>>,
    sent: AtomicU64,
    board: Arc<StatusBoard>,
    worker: Option<JoinHandle<SeekScheduler<R>>>,
}

impl<R: PlaybackResource + 'static> SeekDriver<R> {
    /// Start a driver thread owning `resource`.
    ///
    /// # Errors
    ///
    /// Returns [`StillframeError::IoError`] if the thread or its event loop
    /// cannot be created.
    pub fn spawn(resource: R) -> Result<Self, StillframeError> {
        let runtime = runtime::Builder::new_current_thread().build()?;
        let (commands, receiver) = mpsc::unbounded_channel();
        let board = Arc::new(StatusBoard::default());
        let worker_board = Arc::clone(&board);
        let scheduler = SeekScheduler::new(resource);

        let worker = thread::Builder::new()
            .name("stillframe-seek-driver".to_string())
            .spawn(move || {
                let _stopped = StopGuard(Arc::clone(&worker_board));
                runtime.block_on(drive(scheduler, receiver, &worker_board))
            })?;

        Ok(Self {
            commands: Some(commands),
            sent: AtomicU64::new(0),
            board,
            worker: Some(worker),
        })
    }

    /// See [`SeekScheduler::smoothly_seek`].
    pub fn smoothly_seek(&self, intent: SeekIntent) {
        self.send(DriverCommand::Smooth(intent));
    }

    /// See [`SeekScheduler::directly_seek`].
    pub fn directly_seek(&self, intent: SeekIntent) {
        self.send(DriverCommand::Direct(intent));
    }

    /// See [`SeekScheduler::cancel_pending`].
    pub fn cancel_pending(&self) {
        self.send(DriverCommand::CancelPending);
    }

    /// See [`SeekScheduler::relax_pending_seek`].
    pub fn relax_pending_seek(&self, tolerance_before: MediaTime, tolerance_after: MediaTime) {
        self.send(DriverCommand::Relax {
            tolerance_before,
            tolerance_after,
        });
    }

    /// See [`SeekScheduler::step_by_frame`]. Blocks until the driver has
    /// scheduled the step.
    pub fn step_by_frame(&self, table: &SampleTimingTable, forward: bool) -> Option<MediaTime> {
        let (reply, answer) = std_mpsc::channel();
        self.send(DriverCommand::Step {
            table: table.clone(),
            forward,
            reply,
        });
        answer.recv().ok().flatten()
    }

    /// Run `call` against the resource on the driver thread and return its
    /// result. `None` once the driver has stopped.
    pub fn with_resource<T, F>(&self, call: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut R) -> T + Send + 'static,
    {
        let (reply, answer) = std_mpsc::channel();
        self.send(DriverCommand::WithResource(Box::new(move |resource| {
            let _ = reply.send(call(resource));
        })));
        answer.recv().ok()
    }

    /// Returns `true` while an underlying seek is running.
    pub fn is_seeking(&self) -> bool {
        self.settled().state.is_seeking()
    }

    /// Where the resource will be once idle, if a seek is scheduled.
    pub fn target_time(&self) -> Option<MediaTime> {
        self.settled().state.target_time()
    }

    /// Scheduling state snapshot.
    pub fn state(&self) -> SeekState {
        self.settled().state.clone()
    }

    /// Number of underlying seeks started so far.
    pub fn seeks_issued(&self) -> u64 {
        self.settled().issued
    }

    /// Block until every request sent so far has been handled and no seek is
    /// running or queued. Returns `false` if `timeout` elapsed first or the
    /// driver thread is gone.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let sent = self.sent.load(Ordering::SeqCst);
        let busy = |status: &mut DriverStatus| {
            !status.stopped && (status.handled < sent || status.state.is_seeking())
        };
        let status = self.board.lock();
        let (mut status, _) = self
            .board
            .changed
            .wait_timeout_while(status, timeout, busy)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        !status.stopped && !busy(&mut *status)
    }

    fn settled(&self) -> MutexGuard<'_, DriverStatus> {
        self.board.settled(self.sent.load(Ordering::SeqCst))
    }

    /// Stop the driver thread and give back the resource, abandoning any
    /// scheduled seek.
    pub fn shutdown(mut self) -> Option<R> {
        self.commands = None;
        let worker = self.worker.take()?;
        worker.join().ok().map(SeekScheduler::into_resource)
    }

    fn send(&self, command: DriverCommand<R>) {
        let Some(commands) = self.commands.as_ref() else {
            return;
        };
        self.sent.fetch_add(1, Ordering::SeqCst);
        if commands.send(command).is_err() {
            log::warn!("Seek driver thread has stopped");
        }
    }
}

async fn drive<R: PlaybackResource>(
    mut scheduler: SeekScheduler<R>,
    mut commands: UnboundedReceiver<DriverCommand<R>>,
    board: &StatusBoard,
) -> SeekScheduler<R> {
    let mut handled = 0_u64;
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => {
                    execute(&mut scheduler, command);
                    handled += 1;
                }
                None => break,
            },
            Some((id, finished)) = scheduler.receiver.recv() => scheduler.complete(id, finished),
        }
        board.publish(&scheduler, handled);
    }
    log::debug!("Seek driver stopped after {} request(s)", handled);
    scheduler
}

fn execute<R: PlaybackResource>(scheduler: &mut SeekScheduler<R>, command: DriverCommand<R>) {
    match command {
        DriverCommand::Smooth(intent) => scheduler.smoothly_seek(intent),
        DriverCommand::Direct(intent) => scheduler.directly_seek(intent),
        DriverCommand::CancelPending => scheduler.cancel_pending(),
        DriverCommand::Relax {
            tolerance_before,
            tolerance_after,
        } => scheduler.relax_pending_seek(tolerance_before, tolerance_after),
        DriverCommand::Step {
            table,
            forward,
            reply,
        } => {
            let _ = reply.send(scheduler.step_by_frame(&table, forward));
        }
        DriverCommand::WithResource(call) => call(&mut scheduler.resource),
    }
}
