//! Single-file persistence for the disk cache.
//!
//! The file holds an ordered JSON array of `{ "id", "payload" }` records with
//! the payload base64-encoded. Every save rewrites the whole file through a
//! temp file and a rename, so readers only ever see a complete snapshot.

use crate::{PoolEntry, PoolError, PoolResult};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Base64 engine for entry payloads.
const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    id: String,
    payload: String,
}

/// Atomic file store for pool entries.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    /// Create a store backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all entries, treating a missing or unreadable file as empty.
    pub fn load(&self) -> Vec<PoolEntry> {
        match self.try_load() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Discarding unreadable cache file");
                Vec::new()
            }
        }
    }

    /// Load all entries, surfacing IO and JSON errors.
    ///
    /// A missing file is not an error. Individual records that fail to decode
    /// are skipped so one bad record cannot take the rest of the cache with it.
    pub fn try_load(&self) -> PoolResult<Vec<PoolEntry>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let records: Vec<serde_json::Value> = serde_json::from_slice(&bytes)?;
        let total = records.len();

        let entries: Vec<PoolEntry> = records
            .into_iter()
            .filter_map(|record| {
                let stored: StoredEntry = serde_json::from_value(record).ok()?;
                let payload = BASE64.decode(stored.payload.as_bytes()).ok()?;
                Some(PoolEntry::new(stored.id, payload))
            })
            .collect();

        if entries.len() < total {
            warn!(
                path = %self.path.display(),
                skipped = total - entries.len(),
                "Skipped undecodable cache records"
            );
        }

        debug!(path = %self.path.display(), count = entries.len(), "Loaded cache file");
        Ok(entries)
    }

    /// Overwrite the file with the given entries.
    pub fn save<'a, I>(&self, entries: I) -> PoolResult<()>
    where
        I: IntoIterator<Item = &'a PoolEntry>,
    {
        let records: Vec<StoredEntry> = entries
            .into_iter()
            .map(|entry| StoredEntry {
                id: entry.id().to_string(),
                payload: BASE64.encode(entry.payload()),
            })
            .collect();

        let content = serde_json::to_vec(&records)?;
        atomic_write(&self.path, &content)
    }
}

fn atomic_write(path: &Path, content: &[u8]) -> PoolResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| PoolError::InvalidPath(path.display().to_string()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| PoolError::InvalidPath(path.display().to_string()))?;

    if !dir.as_os_str().is_empty() {
        fs::create_dir_all(dir)?;
    }

    let tmp_path = dir.join(format!(
        ".{}.tmp.{}",
        file_name,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ));

    let write_result = (|| -> Result<(), io::Error> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()?;

        fs::rename(&tmp_path, path)?;

        if let Ok(parent_dir) = fs::File::open(dir) {
            let _ = parent_dir.sync_all();
        }

        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }

    Ok(())
}
