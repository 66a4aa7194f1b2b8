//! Domain errors for the speechscore worker.

use thiserror::Error;

/// Domain-level errors raised by repositories and validation.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No patient holds the token
    #[error("Access token not found")]
    TokenNotFound,

    /// No recording has the key
    #[error("Recording not found: {0}")]
    RecordingNotFound(String),

    /// Stored task type is not `CLAP-A` or `CLAP-D`
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    /// Input rejected before reaching storage
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Storage failure
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Stored value could not be decoded
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}
