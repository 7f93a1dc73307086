//! Error types for ambr-player

use thiserror::Error;

/// Player error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlayerError {
    /// Asset could not be fetched
    #[error("Asset load error: {0}")]
    Load(String),

    /// Asset bytes could not be decoded
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Operation not allowed in the current player state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<reqwest::Error> for PlayerError {
    fn from(e: reqwest::Error) -> Self {
        PlayerError::Load(e.to_string())
    }
}

/// Convenience Result type
pub type Result<T> = std::result::Result<T, PlayerError>;
