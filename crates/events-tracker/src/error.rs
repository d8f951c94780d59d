//! Tracker error types.

use thiserror::Error;

/// Tracker error type.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Event could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Event type was empty
    #[error("Event type must not be empty")]
    EmptyEventType,

    /// No track id configured
    #[error("No track id configured")]
    MissingTrackId,

    /// Pool error
    #[error("Pool error: {0}")]
    Pool(#[from] event_pool::PoolError),

    /// Shipper setup error
    #[error("Shipper error: {0}")]
    Shipper(#[from] event_shipper::ShipperError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] events_config_and_utils::CoreError),
}

/// Result type alias using TrackerError.
pub type TrackerResult<T> = Result<T, TrackerError>;
