//! Error handling integration tests.
//!
//! These tests verify that errors classify correctly and carry meaningful
//! messages.

use std::path::PathBuf;

use stillframe::{ErrorKind, MediaTime, RetryPolicy, StillframeError};

fn at_one_second() -> MediaTime {
    MediaTime::from_seconds(1.0, 600)
}

// ── Classification ─────────────────────────────────────────────────

#[test]
fn input_errors_are_final() {
    for error in [
        StillframeError::InvalidVideo,
        StillframeError::InvalidChunkSize,
        StillframeError::InvalidTimescale(0),
        StillframeError::TrackNotFound {
            track_index: 3,
            track_count: 1,
        },
    ] {
        assert_eq!(error.kind(), ErrorKind::InvalidInput, "{error}");
        assert!(!error.is_retryable(), "{error} should not be retryable");
    }
}

#[test]
fn interruption_and_resource_failures_are_retryable() {
    let interrupted = StillframeError::Interrupted;
    assert_eq!(interrupted.kind(), ErrorKind::Interrupted);
    assert!(interrupted.is_retryable());

    for error in [
        StillframeError::ReadingFailed("corrupt".to_string()),
        StillframeError::FrameGenerationFailed {
            time: at_one_second(),
            reason: "decoder".to_string(),
        },
        StillframeError::EncodingOrWriteFailed {
            time: at_one_second(),
            reason: "disk full".to_string(),
        },
        StillframeError::DirectoryCreationFailed {
            path: PathBuf::from("/nowhere"),
            reason: "denied".to_string(),
        },
    ] {
        assert_eq!(error.kind(), ErrorKind::ResourceFailure, "{error}");
        assert!(error.is_retryable(), "{error} should be retryable");
    }
}

#[test]
fn sample_limit_and_cancellation_are_not_retryable() {
    let limit = StillframeError::SampleLimitReached { limit: 10 };
    assert_eq!(limit.kind(), ErrorKind::SampleLimitReached);
    assert!(!limit.is_retryable());

    let cancelled = StillframeError::Cancelled;
    assert_eq!(cancelled.kind(), ErrorKind::Cancelled);
    assert!(cancelled.is_cancelled());
    assert!(!cancelled.is_retryable());
}

#[test]
fn io_errors_convert() {
    let error: StillframeError =
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
    assert!(matches!(error, StillframeError::IoError(_)));
    assert_eq!(error.kind(), ErrorKind::ResourceFailure);
}

// ── Messages ───────────────────────────────────────────────────────

#[test]
fn messages_carry_context() {
    let track = StillframeError::TrackNotFound {
        track_index: 3,
        track_count: 1,
    }
    .to_string();
    assert!(track.contains('3') && track.contains('1'), "{track}");

    let limit = StillframeError::SampleLimitReached { limit: 42 }.to_string();
    assert!(limit.contains("42"), "Error should mention the limit: {limit}");

    let generation = StillframeError::FrameGenerationFailed {
        time: at_one_second(),
        reason: "no keyframe".to_string(),
    }
    .to_string();
    assert!(generation.contains("1.000s"), "Error should mention the time: {generation}");
    assert!(generation.contains("no keyframe"), "{generation}");

    let directory = StillframeError::DirectoryCreationFailed {
        path: PathBuf::from("/read-only"),
        reason: "denied".to_string(),
    }
    .to_string();
    assert!(directory.contains("/read-only"), "{directory}");
}

#[test]
fn invalid_timescale_is_rejected() {
    let result = MediaTime::new(10, 0);
    match result {
        Err(StillframeError::InvalidTimescale(timescale)) => assert_eq!(timescale, 0),
        other => panic!("Expected InvalidTimescale, got: {other:?}"),
    }
    assert!(MediaTime::new(10, -600).is_err());
}

// ── Retry policy ───────────────────────────────────────────────────

#[test]
fn never_policy_never_retries() {
    assert!(!RetryPolicy::Never.should_retry(&StillframeError::Interrupted, 0));
}

#[test]
fn attempts_policy_counts_failures() {
    let policy = RetryPolicy::Attempts(2);
    assert!(policy.should_retry(&StillframeError::Interrupted, 1));
    assert!(policy.should_retry(&StillframeError::Interrupted, 2));
    assert!(!policy.should_retry(&StillframeError::Interrupted, 3));
}

#[test]
fn attempts_policy_skips_final_errors() {
    let policy = RetryPolicy::Attempts(5);
    assert!(!policy.should_retry(&StillframeError::SampleLimitReached { limit: 1 }, 1));
    assert!(!policy.should_retry(&StillframeError::Cancelled, 1));
    assert!(!policy.should_retry(&StillframeError::InvalidVideo, 1));
}

#[test]
fn custom_policy_sees_error_and_attempt() {
    let policy = RetryPolicy::custom(|error, attempts| error.is_retryable() && attempts < 2);
    assert!(policy.should_retry(&StillframeError::Interrupted, 1));
    assert!(!policy.should_retry(&StillframeError::Interrupted, 2));
    assert!(!policy.should_retry(&StillframeError::InvalidVideo, 1));
}
