//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default collector base URL.
pub const DEFAULT_COLLECTOR_URL: &str = "https://events.example.com";

/// Default seconds between dispatch cycles.
pub const DEFAULT_DISPATCH_INTERVAL_SECS: u64 = 120;

/// Default entries per dispatch.
pub const DEFAULT_DISPATCH_LIMIT: usize = 100;

/// Default cache capacity.
pub const DEFAULT_MAX_CACHE_COUNT: usize = 1000;

/// Default persist debounce in milliseconds.
pub const DEFAULT_PERSIST_DEBOUNCE_MS: u64 = 200;

/// Default max age of a nacked event (one week).
pub const DEFAULT_MAX_EVENT_AGE_SECS: u64 = 7 * 24 * 60 * 60;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Main configuration.
///
/// Missing fields in the config file take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Track id stamped on every event's `client.trackId`.
    pub track_id: Option<String>,
    /// Collector base URL.
    pub collector_url: String,
    /// Seconds between dispatch cycles.
    pub dispatch_interval_secs: u64,
    /// Maximum entries per dispatch.
    pub dispatch_limit: usize,
    /// Maximum cached entries.
    pub max_cache_count: usize,
    /// Delay between a cache mutation and its disk write, in milliseconds.
    pub persist_debounce_ms: u64,
    /// Nacked events older than this many seconds are dropped.
    pub max_event_age_secs: u64,
    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Report batches as shipped without network I/O.
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            track_id: None,
            collector_url: DEFAULT_COLLECTOR_URL.to_string(),
            dispatch_interval_secs: DEFAULT_DISPATCH_INTERVAL_SECS,
            dispatch_limit: DEFAULT_DISPATCH_LIMIT,
            max_cache_count: DEFAULT_MAX_CACHE_COUNT,
            persist_debounce_ms: DEFAULT_PERSIST_DEBOUNCE_MS,
            max_event_age_secs: DEFAULT_MAX_EVENT_AGE_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            dry_run: false,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Check values that would make the pool misbehave.
    pub fn validate(&self) -> CoreResult<()> {
        self.collector_url()?;
        if self.dispatch_interval_secs == 0 {
            return Err(CoreError::Config(
                "dispatch_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(CoreError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.dispatch_limit == 0 {
            return Err(CoreError::Config(
                "dispatch_limit must be greater than zero".to_string(),
            ));
        }
        if self.max_cache_count == 0 {
            return Err(CoreError::Config(
                "max_cache_count must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_env(|name| std::env::var(name).ok());
    }

    /// Override fields from `EVENTS_*` variables supplied by `lookup`.
    ///
    /// Values that do not parse are ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(log_level) = lookup("EVENTS_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(track_id) = lookup("EVENTS_TRACK_ID") {
            self.track_id = Some(track_id);
        }
        if let Some(url) = lookup("EVENTS_COLLECTOR_URL") {
            self.collector_url = url;
        }
        if let Some(raw) = lookup("EVENTS_DISPATCH_INTERVAL_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) => self.dispatch_interval_secs = secs,
                Err(_) => tracing::warn!(value = %raw, "Ignoring invalid EVENTS_DISPATCH_INTERVAL_SECS"),
            }
        }
        if let Some(raw) = lookup("EVENTS_DRY_RUN") {
            match parse_bool(&raw) {
                Some(dry_run) => self.dry_run = dry_run,
                None => tracing::warn!(value = %raw, "Ignoring invalid EVENTS_DRY_RUN"),
            }
        }
    }

    /// Get the collector URL as a parsed URL.
    pub fn collector_url(&self) -> CoreResult<Url> {
        Url::parse(&self.collector_url).map_err(CoreError::from)
    }

    /// Dispatch interval as a duration.
    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch_interval_secs)
    }

    /// Persist debounce as a duration.
    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }

    /// Max nacked event age as a duration.
    pub fn max_event_age(&self) -> Duration {
        Duration::from_secs(self.max_event_age_secs)
    }

    /// Request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
