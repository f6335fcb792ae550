//! Sample timing tables and frame-exact time queries.
//!
//! A [`SampleTimingTable`] is the immutable, presentation-time-sorted list of
//! [`SampleTiming`] entries for one video track, produced by a successful
//! [`SampleTimeIndexer`](crate::SampleTimeIndexer) run. It maps an arbitrary
//! playback time onto the presentation time of an actual frame.
//!
//! # Example
//!
//! ```
//! use stillframe::{MediaTime, SampleTiming, SampleTimingTable};
//!
//! let frame = |seconds: f64| SampleTiming::new(
//!     MediaTime::from_seconds(seconds, 600),
//!     MediaTime::from_seconds(0.3, 600),
//! );
//! let table = SampleTimingTable::from_unsorted(
//!     [0.0, 0.3, 0.6, 0.9, 1.2, 1.5, 1.8].map(frame).to_vec(),
//! );
//!
//! let nearest = table.nearest_sample_timing(MediaTime::from_seconds(1.1, 1000)).unwrap();
//! assert_eq!(nearest.presentation_time, MediaTime::from_seconds(0.9, 600));
//! assert_eq!(table.nearest_sample_index_within_second(MediaTime::from_seconds(1.8, 600)), Some(2));
//! ```

use std::slice::Iter;
use std::sync::Arc;

use crate::search::SortedSearch;
use crate::time::{MediaTime, RoundingMethod};

/// Timescale assumed for a table built without any samples.
const DEFAULT_TIMESCALE: i32 = 600;

/// The timeline position of one decoded sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleTiming {
    /// When the sample is meant to be displayed.
    pub presentation_time: MediaTime,
    /// How long the sample is displayed. May be zero.
    pub duration: MediaTime,
}

impl SampleTiming {
    /// Create a timing entry.
    pub fn new(presentation_time: MediaTime, duration: MediaTime) -> Self {
        Self {
            presentation_time,
            duration,
        }
    }

    /// Presentation time plus duration, saturating to the start time on
    /// overflow.
    pub fn end_time(&self) -> MediaTime {
        self.presentation_time
            .checked_add(self.duration)
            .unwrap_or(self.presentation_time)
    }
}

/// An immutable, sorted sequence of sample timings for one track.
///
/// Cloning is cheap: the entries live behind an [`Arc`] and are never
/// mutated after construction. Re-indexing produces a new table.
/// Duplicate presentation times are allowed.
#[derive(Debug, Clone)]
pub struct SampleTimingTable {
    samples: Arc<[SampleTiming]>,
    timescale: i32,
}

impl SampleTimingTable {
    /// Build a table from entries in any order.
    ///
    /// Entries are stably sorted by presentation time, so entries sharing a
    /// presentation time keep their decode order. The table's timescale is
    /// the finest one used by any entry, so no entry loses precision when
    /// queries are converted into it.
    pub fn from_unsorted(samples: Vec<SampleTiming>) -> Self {
        let timescale = finest_timescale(&samples).unwrap_or(DEFAULT_TIMESCALE);
        Self::sorted(samples, timescale)
    }

    /// Build a table for a track whose native timescale is `timescale`.
    ///
    /// Entries recorded in a finer timescale than the track's raise the
    /// table's timescale to theirs. A non-positive `timescale` is ignored.
    pub fn with_track_timescale(samples: Vec<SampleTiming>, timescale: i32) -> Self {
        let timescale = finest_timescale(&samples)
            .into_iter()
            .chain((timescale > 0).then_some(timescale))
            .max()
            .unwrap_or(DEFAULT_TIMESCALE);
        Self::sorted(samples, timescale)
    }

    fn sorted(mut samples: Vec<SampleTiming>, timescale: i32) -> Self {
        samples.sort_by(|a, b| a.presentation_time.cmp(&b.presentation_time));
        Self {
            samples: samples.into(),
            timescale,
        }
    }

    /// An empty table.
    pub fn empty() -> Self {
        Self::from_unsorted(Vec::new())
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if the table holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The timescale queries are converted into before searching.
    pub fn timescale(&self) -> i32 {
        self.timescale
    }

    /// Entry at `index`.
    pub fn get(&self, index: usize) -> Option<&SampleTiming> {
        self.samples.get(index)
    }

    /// Earliest entry.
    pub fn first(&self) -> Option<&SampleTiming> {
        self.samples.first()
    }

    /// Latest entry.
    pub fn last(&self) -> Option<&SampleTiming> {
        self.samples.last()
    }

    /// All entries in presentation order.
    pub fn as_slice(&self) -> &[SampleTiming] {
        &self.samples
    }

    /// Iterate entries in presentation order.
    pub fn iter(&self) -> Iter<'_, SampleTiming> {
        self.samples.iter()
    }

    /// Span from the first sample's start to the last sample's end.
    pub fn duration(&self) -> MediaTime {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last
                .end_time()
                .checked_sub(first.presentation_time)
                .unwrap_or(MediaTime::ZERO),
            _ => MediaTime::ZERO,
        }
    }

    /// Index of the sample displayed at `query`.
    ///
    /// This is the rightmost sample whose presentation time is at or before
    /// the query, after converting the query into the table's timescale
    /// (rounding half away from zero). Gaps between a sample's end and the
    /// next sample's start are ignored. Queries before the first sample
    /// resolve to index 0. Returns `None` only for an empty table.
    pub fn index_of_nearest_sample(&self, query: MediaTime) -> Option<usize> {
        if self.samples.is_empty() {
            return None;
        }
        let converted = query.convert_scale(self.timescale, RoundingMethod::HalfAwayFromZero);
        let index = self
            .samples
            .last_index_less_than_or_equal_by(|sample| sample.presentation_time.cmp(&converted))
            .unwrap_or(0);
        Some(index)
    }

    /// The sample displayed at `query`. See
    /// [`index_of_nearest_sample`](SampleTimingTable::index_of_nearest_sample).
    pub fn nearest_sample_timing(&self, query: MediaTime) -> Option<SampleTiming> {
        self.index_of_nearest_sample(query)
            .map(|index| self.samples[index])
    }

    /// Rank of the nearest sample among the samples starting in the same
    /// whole second.
    ///
    /// Resolves `query` with
    /// [`nearest_sample_timing`](SampleTimingTable::nearest_sample_timing),
    /// then counts how many samples precede it within its
    /// `floor(seconds)` bucket. When several samples share that presentation
    /// time the first of them determines the rank.
    pub fn nearest_sample_index_within_second(&self, query: MediaTime) -> Option<usize> {
        let sample = self.nearest_sample_timing(query)?;
        let target = sample.presentation_time;
        let second = target.whole_seconds();

        let scale = i64::from(self.timescale);
        let bucket_start = MediaTime::new(second.saturating_mul(scale), self.timescale).ok()?;
        let bucket_end =
            MediaTime::new(second.saturating_add(1).saturating_mul(scale), self.timescale).ok()?;

        let lower = self
            .samples
            .left_insertion_index_by(|entry| entry.presentation_time.cmp(&bucket_start));
        let upper = self
            .samples
            .left_insertion_index_by(|entry| entry.presentation_time.cmp(&bucket_end));

        self.samples[lower..upper]
            .first_index_equal_by(|entry| entry.presentation_time.cmp(&target))
    }

    /// The sample following the one displayed at `query`, if any.
    pub fn sample_after(&self, query: MediaTime) -> Option<SampleTiming> {
        let index = self.index_of_nearest_sample(query)?;
        let current = self.samples[index].presentation_time;
        if query < current {
            return Some(self.samples[index]);
        }
        self.samples[index + 1..]
            .iter()
            .find(|sample| sample.presentation_time > current)
            .copied()
    }

    /// The sample preceding the one displayed at `query`, if any.
    pub fn sample_before(&self, query: MediaTime) -> Option<SampleTiming> {
        let index = self.index_of_nearest_sample(query)?;
        let current = self.samples[index].presentation_time;
        self.samples[..index]
            .iter()
            .rev()
            .find(|sample| sample.presentation_time < current)
            .copied()
    }
}

/// Largest presentation-time timescale among `samples`.
fn finest_timescale(samples: &[SampleTiming]) -> Option<i32> {
    samples
        .iter()
        .map(|sample| sample.presentation_time.timescale())
        .max()
}

impl Default for SampleTimingTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl<'a> IntoIterator for &'a SampleTimingTable {
    type Item = &'a SampleTiming;
    type IntoIter = Iter<'a, SampleTiming>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
