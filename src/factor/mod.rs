//! Factor data: matrices, dedup/merge, and the on-disk artifact
//!
//! A [`FactorMatrix`] is a table indexed by `(timestamp, instrument)`
//! whose columns are named factor values. Two instances matter to the
//! pipeline: the accepted baseline ("SOTA") and the freshly generated
//! candidates. [`FactorMerger`] combines them, dropping candidate
//! columns that are near-duplicates of baseline columns, and the result
//! is persisted as a Parquet artifact with every factor column nested
//! under a single `feature` namespace.

mod artifact;
mod matrix;
mod merge;

pub use artifact::{read_artifact, write_artifact, ARTIFACT_FILE_NAME, FEATURE_NAMESPACE};
pub use matrix::FactorMatrix;
pub use merge::FactorMerger;
