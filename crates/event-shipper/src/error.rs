//! Shipper error types.

use thiserror::Error;

/// Shipper error type.
#[derive(Error, Debug)]
pub enum ShipperError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Collector answered with a non-success status
    #[error("Collector returned status {0}")]
    Status(u16),

    /// Collector URL could not be parsed
    #[error("Invalid collector URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Result type alias using ShipperError.
pub type ShipperResult<T> = Result<T, ShipperError>;
