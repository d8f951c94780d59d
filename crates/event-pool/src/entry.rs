//! Pool entry type.

use std::hash::{Hash, Hasher};

/// One durable unit of work: a caller-assigned id plus an opaque serialized payload.
///
/// Identity is the id alone. Two entries with the same id compare equal even if
/// their payloads differ, which is what the cache relies on for deduplication.
#[derive(Debug, Clone, Eq)]
pub struct PoolEntry {
    id: String,
    payload: Vec<u8>,
}

impl PoolEntry {
    /// Create a new entry.
    pub fn new(id: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
        }
    }

    /// Get the entry id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the serialized payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Split the entry into its id and payload.
    pub fn into_parts(self) -> (String, Vec<u8>) {
        (self.id, self.payload)
    }
}

impl PartialEq for PoolEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Hash for PoolEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
