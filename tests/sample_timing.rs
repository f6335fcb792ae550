//! Sample timing table query tests.

mod common;

use common::{seconds, timing};
use stillframe::{MediaTime, SampleTiming, SampleTimingTable};

fn scrub_table() -> SampleTimingTable {
    SampleTimingTable::from_unsorted(
        [0.0, 0.3, 0.6, 0.9, 1.2, 1.5, 1.8]
            .into_iter()
            .map(|start| timing(start, 0.3))
            .collect(),
    )
}

fn gapped_table() -> SampleTimingTable {
    SampleTimingTable::from_unsorted((0..6).map(|start| timing(start as f64, 0.5)).collect())
}

// ── Nearest sample ─────────────────────────────────────────────────

#[test]
fn gaps_are_ignored() {
    let table = gapped_table();
    let sample = table
        .nearest_sample_timing(seconds(1.9))
        .expect("Expected a sample");
    assert_eq!(sample.presentation_time, seconds(1.0));
}

#[test]
fn exact_hit_returns_that_sample() {
    let table = gapped_table();
    assert_eq!(table.index_of_nearest_sample(seconds(3.0)), Some(3));
}

#[test]
fn before_first_and_after_last() {
    let table = gapped_table();
    let first = table.nearest_sample_timing(seconds(-4.0)).expect("Expected first");
    let last = table.nearest_sample_timing(seconds(99.0)).expect("Expected last");
    assert_eq!(first.presentation_time, seconds(0.0));
    assert_eq!(last.presentation_time, seconds(5.0));
}

#[test]
fn empty_table_has_no_answers() {
    let table = SampleTimingTable::empty();
    assert!(table.nearest_sample_timing(seconds(1.0)).is_none());
    assert!(table.nearest_sample_index_within_second(seconds(1.0)).is_none());
    assert!(table.sample_after(seconds(1.0)).is_none());
}

#[test]
fn query_in_another_timescale_is_converted() {
    let table = scrub_table();
    // 1.25s in milliseconds falls inside the sample starting at 1.2s.
    let query = MediaTime::new(1250, 1000).expect("Failed to build time");
    let sample = table.nearest_sample_timing(query).expect("Expected a sample");
    assert_eq!(sample.presentation_time, seconds(1.2));
}

#[test]
fn coarse_first_entry_does_not_coarsen_queries() {
    // A first sample stored as ZERO has timescale 1; the rest use 600.
    let mut samples = vec![SampleTiming::new(MediaTime::ZERO, seconds(0.3))];
    samples.extend([0.3, 0.6, 0.9, 1.2].into_iter().map(|start| timing(start, 0.3)));
    let table = SampleTimingTable::from_unsorted(samples);

    assert_eq!(table.timescale(), 600);
    let sample = table
        .nearest_sample_timing(seconds(0.65))
        .expect("Expected a sample");
    assert_eq!(sample.presentation_time, seconds(0.6));
}

#[test]
fn mixed_timescales_use_the_finest() {
    let table = SampleTimingTable::from_unsorted(vec![
        SampleTiming::new(MediaTime::ZERO, seconds(0.5)),
        SampleTiming::new(
            MediaTime::new(1001, 30_000).expect("Failed to build time"),
            seconds(0.5),
        ),
        timing(0.5, 0.5),
    ]);
    assert_eq!(table.timescale(), 30_000);

    let query = MediaTime::new(1001, 30_000).expect("Failed to build time");
    assert_eq!(table.index_of_nearest_sample(query), Some(1));
}

#[test]
fn track_timescale_is_respected() {
    let samples = vec![
        SampleTiming::new(MediaTime::ZERO, seconds(0.3)),
        timing(0.3, 0.3),
    ];
    let table = SampleTimingTable::with_track_timescale(samples.clone(), 90_000);
    assert_eq!(table.timescale(), 90_000);

    // A track timescale coarser than the entries never wins.
    let coarse = SampleTimingTable::with_track_timescale(samples, 1);
    assert_eq!(coarse.timescale(), 600);
    assert_eq!(
        coarse.nearest_sample_timing(seconds(0.2)).map(|s| s.presentation_time),
        Some(MediaTime::ZERO)
    );
}

#[test]
fn unsorted_input_is_sorted() {
    let table = SampleTimingTable::from_unsorted(vec![
        timing(2.0, 1.0),
        timing(0.0, 1.0),
        timing(1.0, 1.0),
    ]);
    let starts: Vec<MediaTime> = table.iter().map(|sample| sample.presentation_time).collect();
    assert_eq!(starts, vec![seconds(0.0), seconds(1.0), seconds(2.0)]);
    assert_eq!(table.duration(), seconds(3.0));
}

// ── Index within second ────────────────────────────────────────────

#[test]
fn index_within_second_counts_from_bucket_start() {
    let table = scrub_table();
    assert_eq!(table.nearest_sample_index_within_second(seconds(1.8)), Some(2));
    assert_eq!(table.nearest_sample_index_within_second(seconds(1.2)), Some(0));
}

#[test]
fn index_within_second_uses_resolved_sample() {
    // 1.1s resolves to the sample at 0.9s, the fourth sample of second 0.
    let table = scrub_table();
    assert_eq!(table.nearest_sample_index_within_second(seconds(1.1)), Some(3));
}

#[test]
fn index_within_second_with_duplicates() {
    let table = SampleTimingTable::from_unsorted(vec![
        timing(1.0, 0.1),
        timing(1.5, 0.0),
        timing(1.5, 0.0),
        timing(1.7, 0.1),
    ]);
    assert_eq!(table.nearest_sample_index_within_second(seconds(1.6)), Some(1));
}

// ── Neighbours ─────────────────────────────────────────────────────

#[test]
fn adjacent_samples() {
    let table = gapped_table();
    let after = table.sample_after(seconds(2.2)).expect("Expected a next sample");
    let before = table.sample_before(seconds(2.2)).expect("Expected a previous sample");
    assert_eq!(after.presentation_time, seconds(3.0));
    assert_eq!(before.presentation_time, seconds(1.0));
    assert!(table.sample_after(seconds(5.0)).is_none());
    assert!(table.sample_before(seconds(0.1)).is_none());
}
