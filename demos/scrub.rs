//! Simulate a scrub gesture against a slow player and show how the seek
//! scheduler coalesces it.
//!
//! Usage:
//!   cargo run --example scrub

use std::thread;
use std::time::Duration;

use stillframe::{MediaTime, PlaybackResource, SeekCompletion, SeekIntent, SeekScheduler};

/// A player whose seeks take 20 ms to land.
struct SlowPlayer {
    time: MediaTime,
}

impl PlaybackResource for SlowPlayer {
    fn current_time(&self) -> MediaTime {
        self.time
    }

    fn is_playing(&self) -> bool {
        false
    }

    fn pause(&mut self) {}

    fn seek(&mut self, intent: &SeekIntent, completion: SeekCompletion) {
        println!("  player: seeking to {}", intent.target_time);
        self.time = intent.target_time;
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            completion.complete(true);
        });
    }

    fn cancel_pending_seeks(&mut self) {}
}

fn main() {
    let mut scheduler = SeekScheduler::new(SlowPlayer {
        time: MediaTime::ZERO,
    });

    // Sixty requests, one every 2 ms.
    for step in 1..=60 {
        let target = MediaTime::from_seconds(f64::from(step) / 10.0, 600);
        scheduler.smoothly_seek(SeekIntent::exact(target));
        thread::sleep(Duration::from_millis(2));
    }
    scheduler.wait_until_idle_blocking();

    println!(
        "60 requests, {} seeks issued, landed at {}",
        scheduler.seeks_issued(),
        scheduler.resource().current_time()
    );
}
