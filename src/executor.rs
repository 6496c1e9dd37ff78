//! Bounded parallel execution of sub-task workspaces
//!
//! Jobs run generated artifacts, so a single job failing (by error or
//! by panic) must never take the batch down with it. Each job runs on
//! a bounded worker pool; failures are logged and excluded from the
//! output, and every success keeps its submission index so the caller
//! can pair outputs with their source jobs regardless of completion
//! order. The call is a join-point: it blocks until every dispatched
//! job has settled. No timeout or cancellation once dispatched.

use std::panic::{catch_unwind, AssertUnwindSafe};

use rayon::prelude::*;
use tracing::warn;

use crate::config::Settings;
use crate::{Error, Result};

/// One unit of work: runs to completion and yields its output or fails.
pub type Job<'a, T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send + 'a>;

/// Drop ineligible entries before dispatch, keeping each eligible job's
/// original index. Skipping happens here, visibly, so an ineligible
/// entry never consumes a worker slot.
#[must_use]
pub fn eligible<T>(items: Vec<Option<T>>) -> Vec<(usize, T)> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| item.map(|job| (index, job)))
        .collect()
}

/// Runs independent jobs concurrently on a bounded worker pool,
/// tolerating partial failure.
pub struct ParallelExecutor {
    pool: rayon::ThreadPool,
}

impl ParallelExecutor {
    /// Build an executor whose pool is bounded by the configured
    /// concurrency limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker pool cannot be created.
    pub fn new(settings: &Settings) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.parallelism())
            .build()
            .map_err(|e| Error::Execution(format!("failed to build worker pool: {e}")))?;
        Ok(Self { pool })
    }

    /// Run every job and block until all have settled. Jobs that return
    /// an error or panic are excluded from the result; successes keep
    /// their submission index.
    pub fn run<T: Send>(&self, jobs: Vec<(usize, Job<'_, T>)>) -> Vec<(usize, T)> {
        self.pool.install(|| {
            jobs.into_par_iter()
                .filter_map(|(index, job)| {
                    match catch_unwind(AssertUnwindSafe(job)) {
                        Ok(Ok(output)) => Some((index, output)),
                        Ok(Err(err)) => {
                            warn!(job = index, error = %err, "sub-computation failed, excluding from batch");
                            None
                        }
                        Err(_) => {
                            warn!(job = index, "sub-computation panicked, excluding from batch");
                            None
                        }
                    }
                })
                .collect()
        })
    }
}
