//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use image::{DynamicImage, Rgb, RgbImage};
use stillframe::{
    FrameGenerator, GeneratedFrame, MediaTime, ReadStatus, SampleTiming, SampleTimingReader,
    StillframeError, TrackInfo, TrackKind, VideoSource,
};

pub const TIMESCALE: i32 = 600;

pub fn seconds(value: f64) -> MediaTime {
    MediaTime::from_seconds(value, TIMESCALE)
}

pub fn timing(start: f64, duration: f64) -> SampleTiming {
    SampleTiming::new(seconds(start), seconds(duration))
}

pub fn video_track() -> TrackInfo {
    TrackInfo {
        index: 0,
        kind: TrackKind::Video,
        timescale: TIMESCALE,
        decodable: true,
        width: 8,
        height: 6,
    }
}

/// Count regular files anywhere below `root`.
pub fn count_files(root: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(root) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() { count_files(&path) } else { 1 }
        })
        .sum()
}

/// A video whose readers and generators follow a script.
pub struct ScriptedVideo {
    tracks: Vec<TrackInfo>,
    batches: Vec<Vec<SampleTiming>>,
    statuses: Mutex<VecDeque<ReadStatus>>,
    reader_gate: Mutex<Option<Receiver<()>>>,
    frame_gate: Mutex<Option<Receiver<()>>>,
    fail_frame_at: Option<usize>,
    fail_generator_open: bool,
    pub reader_opens: AtomicUsize,
    pub frames_generated: Arc<AtomicUsize>,
}

impl ScriptedVideo {
    pub fn new(batches: Vec<Vec<SampleTiming>>) -> Self {
        Self {
            tracks: vec![video_track()],
            batches,
            statuses: Mutex::new(VecDeque::new()),
            reader_gate: Mutex::new(None),
            frame_gate: Mutex::new(None),
            fail_frame_at: None,
            fail_generator_open: false,
            reader_opens: AtomicUsize::new(0),
            frames_generated: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A video that only exists to be exported from.
    pub fn for_export() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_tracks(mut self, tracks: Vec<TrackInfo>) -> Self {
        self.tracks = tracks;
        self
    }

    /// Final status of successive reader sessions; `Completed` once exhausted.
    pub fn with_statuses(self, statuses: Vec<ReadStatus>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    /// The first reader waits for one permit before every batch.
    pub fn with_reader_gate(self, gate: Receiver<()>) -> Self {
        *self.reader_gate.lock().unwrap() = Some(gate);
        self
    }

    /// The generator waits for one permit before every frame.
    pub fn with_frame_gate(self, gate: Receiver<()>) -> Self {
        *self.frame_gate.lock().unwrap() = Some(gate);
        self
    }

    /// The generator fails on its `index`-th frame (0-based).
    pub fn failing_frame_at(mut self, index: usize) -> Self {
        self.fail_frame_at = Some(index);
        self
    }

    pub fn failing_generator_open(mut self) -> Self {
        self.fail_generator_open = true;
        self
    }

    pub fn reader_opens(&self) -> usize {
        self.reader_opens.load(Ordering::SeqCst)
    }
}

impl VideoSource for ScriptedVideo {
    fn tracks(&self) -> Result<Vec<TrackInfo>, StillframeError> {
        Ok(self.tracks.clone())
    }

    fn sample_timing_reader(
        &self,
        _track: &TrackInfo,
    ) -> Result<Box<dyn SampleTimingReader>, StillframeError> {
        self.reader_opens.fetch_add(1, Ordering::SeqCst);
        let status = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ReadStatus::Completed);
        Ok(Box::new(ScriptedReader {
            batches: self.batches.clone().into(),
            status,
            gate: self.reader_gate.lock().unwrap().take(),
        }))
    }

    fn frame_generator(
        &self,
        _max_size: Option<(u32, u32)>,
    ) -> Result<Box<dyn FrameGenerator>, StillframeError> {
        if self.fail_generator_open {
            return Err(StillframeError::ReadingFailed("decoder unavailable".to_string()));
        }
        Ok(Box::new(ScriptedGenerator {
            calls: 0,
            fail_at: self.fail_frame_at,
            gate: self.frame_gate.lock().unwrap().take(),
            generated: Arc::clone(&self.frames_generated),
        }))
    }
}

struct ScriptedReader {
    batches: VecDeque<Vec<SampleTiming>>,
    status: ReadStatus,
    gate: Option<Receiver<()>>,
}

impl SampleTimingReader for ScriptedReader {
    fn next_batch(&mut self) -> Option<Vec<SampleTiming>> {
        if let Some(gate) = &self.gate {
            gate.recv().ok()?;
        }
        self.batches.pop_front()
    }

    fn status(&self) -> ReadStatus {
        self.status.clone()
    }
}

struct ScriptedGenerator {
    calls: usize,
    fail_at: Option<usize>,
    gate: Option<Receiver<()>>,
    generated: Arc<AtomicUsize>,
}

impl FrameGenerator for ScriptedGenerator {
    fn generate(&mut self, time: MediaTime) -> Result<GeneratedFrame, StillframeError> {
        if let Some(gate) = &self.gate {
            gate.recv()
                .map_err(|_| StillframeError::ReadingFailed("gate closed".to_string()))?;
        }
        let call = self.calls;
        self.calls += 1;
        if self.fail_at == Some(call) {
            return Err(StillframeError::ReadingFailed(format!("no frame at {time}")));
        }
        self.generated.fetch_add(1, Ordering::SeqCst);

        let shade = (time.as_seconds_f64() * 10.0) as u8;
        let image = RgbImage::from_pixel(8, 6, Rgb([shade, 64, 128]));
        Ok(GeneratedFrame {
            image: DynamicImage::ImageRgb8(image),
            requested_time: time,
            actual_time: time,
        })
    }
}
