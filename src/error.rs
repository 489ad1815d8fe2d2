//! Error types for the Jerez telemetry toolkit
//!
//! Every message says what went wrong and, where it helps, what to do next.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Toolkit error types
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid argument or configuration value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not enough observations for a statistic
    #[error("Insufficient data for {what}: need at least {needed}, got {got}")]
    InsufficientData {
        /// Statistic or table being computed
        what: String,
        /// Minimum number of observations
        needed: usize,
        /// Observations available
        got: usize,
    },

    /// Storage error (CSV/Parquet content)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Table does not carry the expected columns
    #[error(
        "Schema mismatch: expected {expected}, got {got}\n\
         Regenerate the dataset with `jerez-study --data-only`."
    )]
    SchemaMismatch {
        /// Expected schema description
        expected: String,
        /// Schema actually found
        got: String,
    },

    /// MDF4 encoding or decoding failure
    #[error("MDF4 error: {0}")]
    Mdf4(String),

    /// Figure rendering failure
    #[error("Figure rendering failed: {0}")]
    Figure(String),

    /// Dataset verification reported critical failures
    #[error("Dataset verification failed with {0} critical error(s)")]
    VerificationFailed(usize),

    /// Run interrupted by the user (Ctrl-C)
    #[error("Run interrupted by user")]
    Interrupted,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON error (config files, run summary)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
