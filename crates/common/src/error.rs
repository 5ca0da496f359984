//! Error types for memflush.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemflushError {
    #[error("Buffer store error: {0}")]
    Buffer(String),

    #[error("Durable store error: {0}")]
    Durable(String),

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MemflushError>;
