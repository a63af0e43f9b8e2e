//! Error types for dataset fetching and loading.

use thiserror::Error;

/// Result type for dataset operations.
pub type Result<T> = std::result::Result<T, DatasetError>;

/// Error type for dataset operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DatasetError {
    /// The dataset name is not part of the registry.
    #[error("Unsupported dataset: {name}. Supported datasets are: {}", .supported.join(", "))]
    Lookup {
        name: String,
        supported: Vec<&'static str>,
    },

    /// Cloning failed or the array file was absent afterwards.
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// The loaded array does not fit the required columns.
    #[error("Schema mismatch: {0}")]
    Schema(String),

    /// Malformed `.npy` header or pickle stream.
    #[error("Format error: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

impl DatasetError {
    pub fn transfer(msg: impl Into<String>) -> Self {
        DatasetError::Transfer(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        DatasetError::Schema(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        DatasetError::Format(msg.into())
    }
}
