//! Ralph loop error types

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ralph loop operations
pub type RalphResult<T> = Result<T, RalphError>;

/// Errors that end a ralph run
///
/// Per-gate failures are not errors: they are recorded and retried. Only
/// invalid input, lock contention, broken state files and exhaustion surface
/// here.
#[derive(Error, Debug)]
pub enum RalphError {
    /// Another loop owns this directory
    #[error("Ralph loop already running in {} (lock file {})", .path.parent().map(|p| p.display().to_string()).unwrap_or_default(), .path.display())]
    LockHeld { path: PathBuf },

    /// Every iteration was used without passing all gates
    #[error("Maximum iterations ({max}) reached without passing all gates")]
    MaxIterationsReached { max: u32 },

    /// Persisted loop state is missing
    #[error("Ralph state not found at {path}")]
    StateMissing { path: PathBuf },

    /// Invalid input parameters
    #[error("Validation error: {message}")]
    ValidationError { message: String },

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RalphError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    /// Whether the run ended by using up its iteration budget
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, Self::MaxIterationsReached { .. })
    }
}
