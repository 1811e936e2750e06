//! Dispatch engine error types

use std::path::PathBuf;
use thiserror::Error;

use crate::db::DbError;

/// Result type alias for dispatch operations
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// Errors that abort a dispatch pass
///
/// Per-candidate problems (malformed specs, admission conflicts, identity
/// mismatches) are reported in the run summary instead.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Job store error: {0}")]
    Store(#[from] DbError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] jobmill_common::JobmillError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker count must be at least 1, got {0}")]
    InvalidWorkerCount(usize),

    #[error("Failed to list inputs: {0}")]
    Inputs(String),
}

impl DispatchError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn inputs(message: impl Into<String>) -> Self {
        Self::Inputs(message.into())
    }

    pub fn output(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Output {
            path: path.into(),
            source,
        }
    }

    /// Whether the pass may succeed if simply run again
    pub fn is_transient(&self) -> bool {
        matches!(self, DispatchError::Store(err) if err.is_transient())
    }
}
