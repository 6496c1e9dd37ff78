//! Runner configuration
//!
//! A single `Settings` value is constructed once and passed by reference
//! to the components that need it (worker pool size, dedup threshold,
//! expected index granularity). No ambient global state.

use chrono::Duration;

/// Default maximum similarity a candidate factor may have against the
/// accepted baseline before it is dropped as a duplicate.
pub const DEFAULT_CORRELATION_THRESHOLD: f64 = 0.99;

/// Tunable settings for the caching and merge pipeline.
#[derive(Debug, Clone)]
pub struct Settings {
    max_parallel: usize,
    correlation_threshold: f64,
    batch_spacing: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            correlation_threshold: DEFAULT_CORRELATION_THRESHOLD,
            batch_spacing: Duration::days(1),
        }
    }
}

impl Settings {
    /// Create settings with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker-pool bound for parallel sub-workspace execution.
    ///
    /// Clamped to at least 1.
    #[must_use]
    pub fn max_parallel(mut self, n: usize) -> Self {
        self.max_parallel = n.max(1);
        self
    }

    /// Set the dedup similarity cutoff. Candidates are retained only if
    /// their maximum similarity against every baseline column is
    /// strictly below this value.
    #[must_use]
    pub const fn correlation_threshold(mut self, threshold: f64) -> Self {
        self.correlation_threshold = threshold;
        self
    }

    /// Set the expected spacing between consecutive timestamps in
    /// candidate factor data. Sub-computation outputs at a different
    /// granularity are rejected during collection.
    #[must_use]
    pub const fn batch_spacing(mut self, spacing: Duration) -> Self {
        self.batch_spacing = spacing;
        self
    }

    /// Worker-pool bound.
    #[must_use]
    pub const fn parallelism(&self) -> usize {
        self.max_parallel
    }

    /// Dedup similarity cutoff.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.correlation_threshold
    }

    /// Expected timestamp spacing of candidate data.
    #[must_use]
    pub const fn spacing(&self) -> Duration {
        self.batch_spacing
    }
}
