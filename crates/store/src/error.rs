//! Error types for the metadata store.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while reading or writing metadata.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The metadata document could not be written
    #[error("Failed to persist metadata to {path}: {message}")]
    Persistence { path: PathBuf, message: String },

    /// A record with this id already exists
    #[error("Record id already exists: {0}")]
    DuplicateId(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        StoreError::Persistence {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
