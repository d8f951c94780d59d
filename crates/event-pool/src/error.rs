//! Pool error types.

use thiserror::Error;

/// Pool error type.
#[derive(Error, Debug)]
pub enum PoolError {
    /// IO error while reading or writing the cache file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while encoding or decoding the cache file
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Cache file path has no parent directory or file name
    #[error("Invalid cache path: {0}")]
    InvalidPath(String),

    /// The dispatch loop was started twice
    #[error("Dispatch loop already started")]
    AlreadyStarted,
}

/// Result type alias using PoolError.
pub type PoolResult<T> = Result<T, PoolError>;
