//! Development runner: cache-first factor collection, merge, and
//! experiment execution
//!
//! The flow for one develop call: fingerprint the task chain, check the
//! cache, and on a miss resolve the baseline recursively, execute the
//! eligible sub-task workspaces in parallel, merge the successes with
//! the baseline, write the merged artifact into the experiment
//! workspace, run the experiment backend, and persist the whole result
//! object under the fingerprint.

use tracing::{debug, warn};

use crate::cache::ResultCache;
use crate::config::Settings;
use crate::executor::{eligible, Job, ParallelExecutor};
use crate::factor::{write_artifact, FactorMatrix, FactorMerger};
use crate::task::{Experiment, ExperimentBackend, WorkspaceOutput};
use crate::{Error, Result};

/// Column selector passed to sub-task workspaces: every produced column.
pub const SELECT_ALL: &str = "All";

/// Backend selector for an experiment with no baseline chain.
pub const BASELINE_CONFIG: &str = "baseline";

/// Backend selector for an experiment run over merged factors.
pub const COMBINED_CONFIG: &str = "combined";

/// Runs the cached factor development pipeline.
pub struct FactorRunner {
    cache: ResultCache,
    settings: Settings,
    executor: ParallelExecutor,
    merger: FactorMerger,
}

impl FactorRunner {
    /// Build a runner from a cache and settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker pool cannot be created.
    pub fn new(cache: ResultCache, settings: Settings) -> Result<Self> {
        let executor = ParallelExecutor::new(&settings)?;
        let merger = FactorMerger::new(&settings);
        Ok(Self {
            cache,
            settings,
            executor,
            merger,
        })
    }

    /// Develop an experiment, memoized by its task fingerprint.
    ///
    /// On a cache hit only the cached result is copied onto the live
    /// experiment and the expensive path is skipped entirely.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::EmptyFactor`] when no usable candidate data
    /// survives collection and dedup, and any workspace, backend, or
    /// persistence failure.
    pub fn develop(&self, exp: &mut Experiment, backend: &dyn ExperimentBackend) -> Result<()> {
        self.cache
            .get_or_develop(exp, |exp| self.develop_uncached(exp, backend))
    }

    fn develop_uncached(&self, exp: &mut Experiment, backend: &dyn ExperimentBackend) -> Result<()> {
        // resolve the most recent baseline first, cache-first
        if let Some(last) = exp.based_experiments.last_mut() {
            if last.result.is_none() {
                self.develop(last, backend)?;
            }
        }

        if !exp.based_experiments.is_empty() {
            let baseline = if exp.based_experiments.len() > 1 {
                Some(self.collect_factors(&exp.based_experiments)?)
            } else {
                None
            };
            let candidate = self.collect_factors(std::slice::from_ref(exp))?;
            let combined = self.merger.merge(baseline.as_ref(), candidate)?;
            write_artifact(&combined, &exp.workspace_root)?;
        }

        let selector = if exp.based_experiments.is_empty() {
            BASELINE_CONFIG
        } else {
            COMBINED_CONFIG
        };
        let result = backend
            .run(selector)
            .map_err(|e| Error::Execution(e.to_string()))?;
        exp.result = Some(result);
        Ok(())
    }

    /// Execute the eligible sub-task workspaces of each experiment in
    /// parallel and combine the usable outputs column-wise.
    ///
    /// A sub-task is eligible only with a positive feedback signal.
    /// Outputs are kept when non-empty and at the expected index
    /// granularity (minimal timestamp spacing equals the configured
    /// batch spacing). An output with fewer than two distinct
    /// timestamps has no spacing to check and is kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyFactor`] when nothing usable was produced.
    pub fn collect_factors(&self, exps: &[Experiment]) -> Result<FactorMatrix> {
        let mut parts: Vec<FactorMatrix> = Vec::new();

        for exp in exps {
            if exp.sub_tasks.is_empty() {
                // a template experiment with no designed tasks has no
                // factor data of its own
                continue;
            }

            let items: Vec<Option<Job<'_, WorkspaceOutput>>> = exp
                .sub_workspaces
                .iter()
                .zip(&exp.feedback)
                .map(|(workspace, &ok)| {
                    ok.then(|| {
                        Box::new(move || workspace.execute(SELECT_ALL)) as Job<'_, WorkspaceOutput>
                    })
                })
                .collect();

            let outputs = self.executor.run(eligible(items));
            for (index, (message, matrix)) in outputs {
                debug!(job = index, message = %message, "sub-computation finished");
                if matrix.is_empty() {
                    warn!(job = index, "sub-computation produced no data, skipping");
                    continue;
                }
                // fewer than two distinct timestamps means no spacing
                // to check; such outputs pass the granularity gate
                if let Some(spacing) = matrix.min_timestamp_spacing() {
                    if spacing != self.settings.spacing() {
                        warn!(
                            job = index,
                            "sub-computation output has unexpected index granularity, skipping"
                        );
                        continue;
                    }
                }
                parts.push(matrix);
            }
        }

        if parts.is_empty() {
            return Err(Error::EmptyFactor(
                "no sub-computation produced usable factor data".to_string(),
            ));
        }
        Ok(FactorMatrix::concat_columns(parts))
    }
}
