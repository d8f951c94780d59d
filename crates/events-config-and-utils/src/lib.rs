//! Core configuration and utilities for the events pool.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_COLLECTOR_URL, DEFAULT_DISPATCH_INTERVAL_SECS, DEFAULT_DISPATCH_LIMIT,
    DEFAULT_LOG_LEVEL, DEFAULT_MAX_CACHE_COUNT, DEFAULT_MAX_EVENT_AGE_SECS,
    DEFAULT_PERSIST_DEBOUNCE_MS, DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_with, parse_level, LogConfig, LogFileWriter};
pub use paths::Paths;
