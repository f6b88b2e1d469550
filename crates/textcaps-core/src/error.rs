use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while preparing data or running the classifier.
#[derive(Debug, Error)]
pub enum TextCapsError {
    /// Reading or writing a dataset, cache or vectors file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A cache file or record could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Candle ML framework error.
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    /// A regex pattern failed to compile (should not happen with static patterns).
    #[error("regex compilation error: {0}")]
    Regex(#[from] regex::Error),

    /// A line of a dataset file could not be parsed.
    #[error("malformed record at {}:{line}: {reason}", path.display())]
    MalformedRecord {
        /// File containing the record.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// A dataset split contained no usable examples.
    #[error("dataset split {split:?} is empty")]
    EmptyDataset {
        /// Split name, `train` or `test`.
        split: String,
    },

    /// The dataset identifier is not one of the supported datasets.
    #[error("unknown dataset type {0:?}")]
    UnknownDataType(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A pretrained vectors file could not be used.
    #[error("invalid vectors file: {0}")]
    Vectors(String),
}

/// Result type alias for textcaps core operations.
pub type Result<T> = std::result::Result<T, TextCapsError>;
