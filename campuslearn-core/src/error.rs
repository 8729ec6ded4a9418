//! Error types for campuslearn-core

use thiserror::Error;

/// Main error type for the campuslearn-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (backend unavailable or query failure)
    #[error("storage error: {0}")]
    Store(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid input for an operation
    #[error("validation error: {0}")]
    Validation(String),

    /// Illegal state transition or a lost conditional update
    #[error("conflict on escalation {escalation_id}: cannot {action} while {status}")]
    Conflict {
        escalation_id: String,
        status: String,
        action: String,
    },

    /// Escalation not found
    #[error("escalation not found: {0}")]
    EscalationNotFound(String),

    /// Tutor not found
    #[error("tutor not found: {0}")]
    TutorNotFound(String),
}

impl Error {
    /// Build a conflict error for an attempted workflow action.
    pub fn conflict(escalation_id: &str, status: &str, action: &str) -> Self {
        Error::Conflict {
            escalation_id: escalation_id.to_string(),
            status: status.to_string(),
            action: action.to_string(),
        }
    }

    /// True when the error is a workflow conflict rather than a hard failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}

/// Result type alias for campuslearn-core
pub type Result<T> = std::result::Result<T, Error>;
