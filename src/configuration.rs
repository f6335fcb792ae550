//! Operation configuration.
//!
//! [`IndexingOptions`] and [`ExportOptions`] are builders that thread
//! progress callbacks, cancellation tokens, and tuning settings through
//! indexing and export without polluting every function signature.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use stillframe::{CancellationToken, IndexingOptions, ProgressCallback, ProgressInfo, RetryPolicy};
//!
//! struct LogProgress;
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{:?}: {} done", info.operation, info.current);
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = IndexingOptions::new()
//!     .with_sample_limit(500_000)
//!     .with_retry_policy(RetryPolicy::Attempts(2))
//!     .with_progress(Arc::new(LogProgress))
//!     .with_cancellation(token.clone())
//!     .with_batch_size(1_000);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::error::StillframeError;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// Predicate deciding whether a failed indexing run should restart.
///
/// Receives the failure and the number of failed attempts so far
/// (starting at 1).
pub type RetryPredicate = Arc<dyn Fn(&StillframeError, u32) -> bool + Send + Sync>;

/// Whether a failed indexing run is restarted from scratch.
///
/// Restarts discard all partial progress; there is no incremental resume.
/// Cancellation is never retried regardless of policy.
#[derive(Clone, Default)]
pub enum RetryPolicy {
    /// Report the first failure. This is the default.
    #[default]
    Never,
    /// Restart up to `n` times when the failure is
    /// [retryable](StillframeError::is_retryable).
    Attempts(u32),
    /// Restart whenever the predicate returns `true`.
    Custom(RetryPredicate),
}

impl RetryPolicy {
    /// Build a [`RetryPolicy::Custom`] from a closure.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&StillframeError, u32) -> bool + Send + Sync + 'static,
    {
        RetryPolicy::Custom(Arc::new(predicate))
    }

    /// Decide whether to restart after `failed_attempts` failures, the last
    /// of which was `error`.
    pub fn should_retry(&self, error: &StillframeError, failed_attempts: u32) -> bool {
        if error.is_cancelled() || matches!(error, StillframeError::SampleLimitReached { .. }) {
            return false;
        }
        match self {
            RetryPolicy::Never => false,
            RetryPolicy::Attempts(limit) => error.is_retryable() && failed_attempts <= *limit,
            RetryPolicy::Custom(predicate) => predicate(error, failed_attempts),
        }
    }
}

impl Debug for RetryPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RetryPolicy::Never => write!(f, "Never"),
            RetryPolicy::Attempts(limit) => f.debug_tuple("Attempts").field(limit).finish(),
            RetryPolicy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Configuration for sample time indexing.
///
/// All fields have sensible defaults: no sample limit, no retries, no
/// progress callback, no external cancellation.
#[derive(Clone)]
pub struct IndexingOptions {
    /// Abort with [`StillframeError::SampleLimitReached`] past this many samples.
    pub(crate) sample_limit: Option<usize>,
    /// Restart policy for failed runs.
    pub(crate) retry_policy: RetryPolicy,
    /// Progress callback. Defaults to a no-op.
    pub(crate) progress: Arc<dyn ProgressCallback>,
    /// Extra cancellation token observed alongside the run's own.
    pub(crate) cancellation: Option<CancellationToken>,
    /// How often to fire the progress callback (every N samples).
    pub(crate) batch_size: u64,
}

impl Debug for IndexingOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("IndexingOptions")
            .field("sample_limit", &self.sample_limit)
            .field("retry_policy", &self.retry_policy)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl Default for IndexingOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexingOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            sample_limit: None,
            retry_policy: RetryPolicy::Never,
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1_000,
        }
    }

    /// Abort indexing once more than `limit` samples have been read.
    #[must_use]
    pub fn with_sample_limit(mut self, limit: usize) -> Self {
        self.sample_limit = Some(limit);
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Set how often the progress callback fires, in samples.
    /// Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }
}

/// Configuration for frame export runs.
///
/// Carries optional progress and cancellation settings. The frames
/// themselves are described by a [`FrameExportRequest`](crate::FrameExportRequest).
#[derive(Clone)]
pub struct ExportOptions {
    /// Progress callback. Defaults to a no-op.
    pub(crate) progress: Arc<dyn ProgressCallback>,
    /// Extra cancellation token observed alongside the run's own.
    pub(crate) cancellation: Option<CancellationToken>,
    /// How often to fire the progress callback (every N frames).
    pub(crate) batch_size: u64,
}

impl Debug for ExportOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ExportOptions")
            .field("has_progress", &true)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportOptions {
    /// Create options with default settings.
    ///
    /// Defaults: no progress callback, no cancellation, batch size 1.
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
        }
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// Cancelling it has the same effect as
    /// [`ExportHandle::cancel`](crate::ExportHandle::cancel), observed at
    /// the next frame boundary.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Set how often the progress callback fires.
    /// Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_policy_retries_only_retryable_failures() {
        let policy = RetryPolicy::Attempts(2);
        assert!(policy.should_retry(&StillframeError::Interrupted, 1));
        assert!(policy.should_retry(&StillframeError::Interrupted, 2));
        assert!(!policy.should_retry(&StillframeError::Interrupted, 3));
        assert!(!policy.should_retry(&StillframeError::InvalidVideo, 1));
        assert!(!policy.should_retry(&StillframeError::SampleLimitReached { limit: 5 }, 1));
    }

    #[test]
    fn custom_policy_never_sees_cancellation() {
        let policy = RetryPolicy::custom(|_, _| true);
        assert!(policy.should_retry(&StillframeError::InvalidVideo, 1));
        assert!(!policy.should_retry(&StillframeError::Cancelled, 1));
    }

    #[test]
    fn custom_policy_never_sees_sample_limit() {
        let policy = RetryPolicy::custom(|_, _| true);
        assert!(!policy.should_retry(&StillframeError::SampleLimitReached { limit: 5 }, 1));
    }

    #[test]
    fn batch_size_is_clamped() {
        let options = ExportOptions::new().with_batch_size(0);
        assert_eq!(options.batch_size, 1);
    }
}
