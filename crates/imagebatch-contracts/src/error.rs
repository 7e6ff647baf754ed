use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failures surfaced by the batch contracts.
///
/// Only `CorruptRecord`, `StorageWrite` and `Event` abort a run. `InvalidInput`
/// and `Provider` are scoped to a single item and end up in the record.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("generation record {} is corrupt: {message}", path.display())]
    CorruptRecord { path: PathBuf, message: String },

    #[error("provider error: {0}")]
    Provider(String),

    #[error("failed to persist generation record {}: {message}", path.display())]
    StorageWrite { path: PathBuf, message: String },

    #[error("event log write failed: {0}")]
    Event(String),
}

impl BatchError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub(crate) fn corrupt(path: &Path, message: impl ToString) -> Self {
        Self::CorruptRecord {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }

    pub(crate) fn storage_write(path: &Path, message: impl ToString) -> Self {
        Self::StorageWrite {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }

    /// True for failures that invalidate resumability for the whole batch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CorruptRecord { .. } | Self::StorageWrite { .. } | Self::Event(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;
