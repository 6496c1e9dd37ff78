//! # Factor-Forge: cached factor development pipeline
//!
//! Factor-forge is the result-caching, cross-run knowledge persistence,
//! and factor dedup/merge layer of an agent-driven quant research loop.
//! Re-running expensive development for task sets already seen is
//! wasteful, and merging freshly generated candidate factors into an
//! accepted baseline risks polluting the feature space with
//! near-duplicate signals; this crate owns both concerns.
//!
//! ## Components
//!
//! - [`fingerprint`]: stable identity for an ordered task collection
//! - [`cache::ResultCache`]: memoizes expensive develop calls
//! - [`knowledge::KnowledgeStore`]: durable attribute bag across runs
//! - [`executor::ParallelExecutor`]: bounded pool, partial-failure
//!   tolerant
//! - [`factor::FactorMerger`]: correlation-based dedup and merge of
//!   candidate factor matrices
//! - [`runner::FactorRunner`]: the develop flow tying them together
//!
//! ## Example
//!
//! ```rust,no_run
//! use factor_forge::cache::ResultCache;
//! use factor_forge::config::Settings;
//! use factor_forge::runner::FactorRunner;
//! use factor_forge::task::{Experiment, TaskDescriptor, TaskKind};
//!
//! # struct Backtest;
//! # impl factor_forge::task::ExperimentBackend for Backtest {
//! #     fn run(&self, _selector: &str) -> anyhow::Result<serde_json::Value> {
//! #         Ok(serde_json::json!({}))
//! #     }
//! # }
//! # fn main() -> factor_forge::Result<()> {
//! let runner = FactorRunner::new(ResultCache::new("cache"), Settings::new())?;
//! let mut exp = Experiment::new(vec![
//!     TaskDescriptor::new("momentum_20d", "20-day momentum", TaskKind::Factor),
//! ]);
//! runner.develop(&mut exp, &Backtest)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod factor;
pub mod fingerprint;
pub mod knowledge;
pub mod runner;
pub mod task;

pub use error::{Error, Result};
