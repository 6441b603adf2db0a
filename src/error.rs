//! Error types for labeling and evaluation.

use thiserror::Error;

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParseError(#[from] chrono::ParseError),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Invalid horizon: {0} (horizon_periods must be at least 1)")]
    InvalidHorizon(usize),

    #[error("Insufficient training data for fold {fold}: {rows} rows, at least {required} required")]
    InsufficientTrainingData {
        fold: String,
        rows: usize,
        required: usize,
    },

    #[error("Model failed on fold {fold}: {message}")]
    Model { fold: String, message: String },

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("No data loaded")]
    NoData,
}

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, Error>;
