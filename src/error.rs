//! Error types for factor-forge

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Factor-forge error types
#[derive(Error, Debug)]
pub enum Error {
    /// No usable factor data: the candidate matrix was empty, every
    /// candidate column was deduplicated away, or no sub-computation
    /// produced data at the expected index granularity. Fatal to the
    /// merge call; callers must regenerate candidates rather than
    /// proceed with an empty feature set.
    #[error("no valid factor data found to merge: {0}")]
    EmptyFactor(String),

    /// A workspace or experiment backend run failed
    #[error("execution failed: {0}")]
    Execution(String),

    /// Cache, knowledge, or artifact persistence error
    #[error("storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    /// True for the named "no usable data" condition, so callers can
    /// branch on it without matching the whole enum.
    #[must_use]
    pub const fn is_empty_factor(&self) -> bool {
        matches!(self, Self::EmptyFactor(_))
    }
}
