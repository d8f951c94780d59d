//! Shipper configuration.

use crate::ShipperResult;
use std::time::Duration;
use url::Url;

/// Default collector base URL.
pub const DEFAULT_COLLECTOR_URL: &str = "https://events.example.com";

/// Default HTTP request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default age after which a nacked event is dropped instead of retried.
pub const DEFAULT_MAX_EVENT_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Shipper configuration.
#[derive(Debug, Clone)]
pub struct ShipperConfig {
    /// Collector base URL. Batches are posted to `{base_url}/track`.
    pub base_url: String,
    /// Request timeout.
    pub request_timeout: Duration,
    /// Nacked events recorded longer ago than this are dropped.
    pub max_event_age: Duration,
    /// Report every entry as shipped without touching the network.
    pub dry_run: bool,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_COLLECTOR_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_event_age: DEFAULT_MAX_EVENT_AGE,
            dry_run: false,
        }
    }
}

impl ShipperConfig {
    /// Create a config for the given collector with default settings.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Full URL of the track endpoint.
    ///
    /// `track` is appended as a path component, so a base URL with a path
    /// prefix keeps it.
    pub fn track_url(&self) -> ShipperResult<Url> {
        let base = self.base_url.trim_end_matches('/');
        Ok(Url::parse(&format!("{}/track", base))?)
    }
}
