/// Error types for the lost-and-found core
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LostFoundError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl From<sled::Error> for LostFoundError {
    fn from(e: sled::Error) -> Self {
        LostFoundError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LostFoundError>;
