//! Seek scheduler integration tests against mock playback resources.

mod common;

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use common::{seconds, timing};
use stillframe::{
    MediaTime, PlaybackResource, SampleTimingTable, SeekCompletion, SeekDriver, SeekIntent,
    SeekScheduler,
};

/// A player whose seeks only finish when the test says so.
#[derive(Default)]
struct ManualPlayer {
    time: MediaTime,
    playing: bool,
    pauses: usize,
    cancels: usize,
    started: Vec<SeekIntent>,
    in_flight: VecDeque<(SeekIntent, SeekCompletion)>,
    max_in_flight: usize,
}

impl ManualPlayer {
    /// Land the oldest in-flight seek on its target.
    fn finish_oldest(&mut self) {
        let (intent, completion) = self
            .in_flight
            .pop_front()
            .expect("Expected a seek in flight");
        self.time = intent.target_time;
        completion.complete(true);
    }

    fn started_targets(&self) -> Vec<MediaTime> {
        self.started.iter().map(|intent| intent.target_time).collect()
    }
}

impl PlaybackResource for ManualPlayer {
    fn current_time(&self) -> MediaTime {
        self.time
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn pause(&mut self) {
        self.playing = false;
        self.pauses += 1;
    }

    fn seek(&mut self, intent: &SeekIntent, completion: SeekCompletion) {
        self.started.push(*intent);
        self.in_flight.push_back((*intent, completion));
        self.max_in_flight = self.max_in_flight.max(self.in_flight.len());
    }

    fn cancel_pending_seeks(&mut self) {
        self.cancels += 1;
        for (_, completion) in self.in_flight.drain(..) {
            completion.complete(false);
        }
    }
}

/// A player that lands each seek on a background thread.
struct ThreadedPlayer {
    time: MediaTime,
    delay: Duration,
}

impl PlaybackResource for ThreadedPlayer {
    fn current_time(&self) -> MediaTime {
        self.time
    }

    fn is_playing(&self) -> bool {
        false
    }

    fn pause(&mut self) {}

    fn seek(&mut self, intent: &SeekIntent, completion: SeekCompletion) {
        self.time = intent.target_time;
        let delay = self.delay;
        thread::spawn(move || {
            thread::sleep(delay);
            completion.complete(true);
        });
    }

    fn cancel_pending_seeks(&mut self) {}
}

fn drain(scheduler: &mut SeekScheduler<ManualPlayer>) {
    while scheduler.is_seeking() {
        scheduler.resource_mut().finish_oldest();
        scheduler.process_completions();
    }
}

// ── Smooth seeking ─────────────────────────────────────────────────

#[test]
fn burst_coalesces_and_lands_on_last_request() {
    let mut scheduler = SeekScheduler::new(ManualPlayer::default());
    for step in 1..=10 {
        scheduler.smoothly_seek(SeekIntent::exact(seconds(f64::from(step))));
        if step == 5 {
            scheduler.resource_mut().finish_oldest();
        }
    }
    drain(&mut scheduler);

    let player = scheduler.resource();
    assert_eq!(player.current_time(), seconds(10.0));
    assert_eq!(
        player.started_targets(),
        vec![seconds(1.0), seconds(5.0), seconds(10.0)]
    );
    assert!(player.max_in_flight <= 2, "max in flight: {}", player.max_in_flight);
    assert_eq!(scheduler.seeks_issued(), 3);
}

#[test]
fn repeated_target_does_not_issue_new_seek() {
    let mut scheduler = SeekScheduler::new(ManualPlayer::default());
    scheduler.smoothly_seek(SeekIntent::exact(seconds(2.0)));
    scheduler.smoothly_seek(SeekIntent::exact(seconds(2.0)));
    drain(&mut scheduler);
    scheduler.smoothly_seek(SeekIntent::exact(seconds(2.0)));

    assert_eq!(scheduler.seeks_issued(), 1);
    assert!(!scheduler.is_seeking());
}

#[test]
fn seeking_pauses_playback() {
    let mut scheduler = SeekScheduler::new(ManualPlayer {
        playing: true,
        ..ManualPlayer::default()
    });
    scheduler.smoothly_seek(SeekIntent::exact(seconds(1.0)));

    assert!(!scheduler.resource().playing);
    assert_eq!(scheduler.resource().pauses, 1);
}

#[test]
fn target_time_reports_queued_destination() {
    let mut scheduler = SeekScheduler::new(ManualPlayer::default());
    assert_eq!(scheduler.target_time(), None);

    scheduler.smoothly_seek(SeekIntent::exact(seconds(1.0)));
    scheduler.smoothly_seek(SeekIntent::exact(seconds(4.0)));
    assert_eq!(scheduler.target_time(), Some(seconds(4.0)));
}

// ── Direct seeking and cancellation ────────────────────────────────

#[test]
fn direct_seek_cancels_and_starts_immediately() {
    let mut scheduler = SeekScheduler::new(ManualPlayer::default());
    scheduler.smoothly_seek(SeekIntent::exact(seconds(1.0)));
    scheduler.smoothly_seek(SeekIntent::exact(seconds(2.0)));
    scheduler.directly_seek(SeekIntent::exact(seconds(7.0)));

    assert_eq!(scheduler.resource().cancels, 1);
    assert_eq!(
        scheduler.resource().started_targets(),
        vec![seconds(1.0), seconds(7.0)]
    );

    // The cancelled seek's completion arrives late and must be ignored.
    assert_eq!(scheduler.process_completions(), 1);
    assert!(scheduler.is_seeking());

    drain(&mut scheduler);
    assert_eq!(scheduler.resource().current_time(), seconds(7.0));
}

#[test]
fn cancel_pending_drops_everything() {
    let mut scheduler = SeekScheduler::new(ManualPlayer::default());
    scheduler.smoothly_seek(SeekIntent::exact(seconds(1.0)));
    scheduler.smoothly_seek(SeekIntent::exact(seconds(3.0)));
    scheduler.cancel_pending();

    assert!(!scheduler.is_seeking());
    assert_eq!(scheduler.target_time(), None);
    assert_eq!(scheduler.resource().cancels, 1);
    assert_eq!(scheduler.seeks_issued(), 1);
}

#[test]
fn dropped_completion_counts_as_unfinished() {
    let mut scheduler = SeekScheduler::new(ManualPlayer::default());
    scheduler.smoothly_seek(SeekIntent::exact(seconds(1.0)));
    scheduler.smoothly_seek(SeekIntent::exact(seconds(2.0)));

    // Losing the completion must not wedge the scheduler.
    scheduler.resource_mut().in_flight.clear();
    assert_eq!(scheduler.process_completions(), 1);
    assert_eq!(scheduler.resource().started_targets(), vec![seconds(1.0), seconds(2.0)]);
}

// ── Relaxing and frame stepping ────────────────────────────────────

#[test]
fn relax_restarts_running_seek_with_wider_tolerance() {
    let wide = seconds(0.25);
    let mut scheduler = SeekScheduler::new(ManualPlayer::default());
    scheduler.smoothly_seek(SeekIntent::exact(seconds(1.0)));
    scheduler.smoothly_seek(SeekIntent::exact(seconds(6.0)));
    scheduler.relax_pending_seek(wide, wide);

    let player = scheduler.resource();
    assert_eq!(player.cancels, 1);
    let restarted = player.started.last().expect("Expected a restarted seek");
    assert_eq!(restarted.target_time, seconds(6.0));
    assert_eq!(restarted.tolerance_before, wide);
    assert_eq!(restarted.tolerance_after, wide);
    assert_eq!(scheduler.state().queued(), None);
}

fn half_second_table() -> SampleTimingTable {
    SampleTimingTable::from_unsorted(vec![
        timing(1.5, 0.5),
        timing(0.0, 0.5),
        timing(1.0, 0.5),
        timing(0.5, 0.5),
    ])
}

#[test]
fn step_by_frame_walks_adjacent_samples() {
    let table = half_second_table();
    let mut scheduler = SeekScheduler::new(ManualPlayer {
        time: seconds(1.0),
        ..ManualPlayer::default()
    });

    assert_eq!(scheduler.step_by_frame(&table, true), Some(seconds(1.5)));
    drain(&mut scheduler);
    assert_eq!(scheduler.step_by_frame(&table, true), None);

    assert_eq!(scheduler.step_by_frame(&table, false), Some(seconds(1.0)));
    assert_eq!(scheduler.step_by_frame(&table, false), Some(seconds(0.5)));
    drain(&mut scheduler);
    assert_eq!(scheduler.resource().current_time(), seconds(0.5));
}

#[test]
fn step_during_scrub_relaxes_running_seek() {
    let table = half_second_table();
    let mut scheduler = SeekScheduler::new(ManualPlayer::default());
    scheduler.smoothly_seek(SeekIntent::exact(seconds(0.5)));

    assert_eq!(scheduler.step_by_frame(&table, true), Some(seconds(1.0)));
    let player = scheduler.resource();
    assert_eq!(player.cancels, 1);
    let relaxed = player.started.last().expect("Expected a relaxed seek");
    assert_eq!(relaxed.target_time, seconds(0.5));
    assert_eq!(relaxed.tolerance_before, seconds(0.5));
    assert_eq!(scheduler.target_time(), Some(seconds(1.0)));
}

// ── Waiting ────────────────────────────────────────────────────────

#[test]
fn wait_blocking_for_threaded_completions() {
    let mut scheduler = SeekScheduler::new(ThreadedPlayer {
        time: MediaTime::ZERO,
        delay: Duration::from_millis(50),
    });
    for step in 1..=4 {
        scheduler.smoothly_seek(SeekIntent::exact(seconds(f64::from(step))));
    }
    scheduler.wait_until_idle_blocking();

    assert!(!scheduler.is_seeking());
    assert_eq!(scheduler.resource().current_time(), seconds(4.0));
    assert_eq!(scheduler.seeks_issued(), 2);
}

#[tokio::test]
async fn wait_async_for_threaded_completions() {
    let mut scheduler = SeekScheduler::new(ThreadedPlayer {
        time: MediaTime::ZERO,
        delay: Duration::from_millis(50),
    });
    scheduler.smoothly_seek(SeekIntent::exact(seconds(1.0)));
    scheduler.smoothly_seek(SeekIntent::exact(seconds(9.0)));
    scheduler.wait_until_idle().await;

    assert!(!scheduler.is_seeking());
    assert_eq!(scheduler.resource().current_time(), seconds(9.0));
}

// ── Self-driving scheduler ─────────────────────────────────────────

#[test]
fn driver_starts_queued_intent_without_further_calls() {
    let driver = SeekDriver::spawn(ThreadedPlayer {
        time: MediaTime::ZERO,
        delay: Duration::from_millis(50),
    })
    .expect("Failed to spawn seek driver");
    driver.smoothly_seek(SeekIntent::exact(seconds(1.0)));
    driver.smoothly_seek(SeekIntent::exact(seconds(2.0)));

    // Nobody calls into the driver while the seeks land.
    thread::sleep(Duration::from_millis(300));

    assert!(!driver.is_seeking(), "Queued intent must have been run");
    assert_eq!(driver.with_resource(|player| player.time), Some(seconds(2.0)));
    assert_eq!(driver.seeks_issued(), 2);
}

#[test]
fn driver_wait_covers_unhandled_requests() {
    let driver = SeekDriver::spawn(ThreadedPlayer {
        time: MediaTime::ZERO,
        delay: Duration::from_millis(20),
    })
    .expect("Failed to spawn seek driver");
    for step in 1..=20 {
        driver.smoothly_seek(SeekIntent::exact(seconds(f64::from(step))));
    }

    assert!(driver.wait_until_idle(Duration::from_secs(5)), "Driver never went idle");
    assert_eq!(driver.target_time(), None);
    let player = driver.shutdown().expect("Failed to stop seek driver");
    assert_eq!(player.current_time(), seconds(20.0));
}

#[test]
fn driver_wait_times_out_while_seek_is_stuck() {
    let driver = SeekDriver::spawn(ManualPlayer::default()).expect("Failed to spawn seek driver");
    driver.smoothly_seek(SeekIntent::exact(seconds(3.0)));

    assert!(!driver.wait_until_idle(Duration::from_millis(50)));
    assert_eq!(driver.state().running().map(|(id, _)| id), Some(1));

    // Landing the seek from the resource side finishes it.
    driver.with_resource(ManualPlayer::finish_oldest);
    assert!(driver.wait_until_idle(Duration::from_secs(5)));
}

#[test]
fn driver_steps_and_cancels() {
    let table = half_second_table();
    let driver = SeekDriver::spawn(ManualPlayer {
        time: seconds(0.5),
        ..ManualPlayer::default()
    })
    .expect("Failed to spawn seek driver");

    assert_eq!(driver.step_by_frame(&table, true), Some(seconds(1.0)));
    assert_eq!(driver.target_time(), Some(seconds(1.0)));

    driver.cancel_pending();
    assert!(driver.wait_until_idle(Duration::from_secs(5)));
    let player = driver.shutdown().expect("Failed to stop seek driver");
    assert_eq!(player.cancels, 1);
    assert_eq!(player.started_targets(), vec![seconds(1.0)]);
}
