//! Error types for jobmill

use thiserror::Error;

/// Result type alias for jobmill operations
pub type Result<T> = std::result::Result<T, JobmillError>;

/// Main error type for jobmill
#[derive(Error, Debug)]
pub enum JobmillError {
    #[error("Malformed analysis spec for input '{input_ref}': {reason}")]
    MalformedSpec { input_ref: String, reason: String },

    #[error("Job hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch { stored: String, computed: String },

    #[error("Invalid job status: {0}")]
    InvalidStatus(String),
}

impl JobmillError {
    /// Create a malformed spec error for one candidate
    pub fn malformed_spec(input_ref: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedSpec {
            input_ref: input_ref.into(),
            reason: reason.into(),
        }
    }
}
