//! File system paths for the events pool.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Cache file name under the base directory.
const CACHE_FILE_NAME: &str = "events_pool.json";

/// Manages file system paths.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.events)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.events`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".events"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.events).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.events/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the event cache file path (~/.events/events_pool.json).
    pub fn cache_file(&self) -> PathBuf {
        self.base_dir.join(CACHE_FILE_NAME)
    }

    /// Get the logs directory (~/.events/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the JSONL log file path (~/.events/logs/events.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("events.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
