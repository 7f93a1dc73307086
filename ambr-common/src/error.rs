//! Common error types for Ambr

use thiserror::Error;

/// Common result type for Ambr operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Ambr services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested book, scene or asset does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invariant violation detected before persistence
    #[error("Validation error: {0}")]
    Validation(String),

    /// Asset read/write failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors a caller may reasonably retry once
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Io(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(format!("JSON error: {}", err))
    }
}
