//! Cache contract and the in-memory implementation.

use crate::PoolEntry;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// Default maximum number of entries held by a cache.
pub const DEFAULT_MAX_COUNT: usize = 1000;

/// Bounded, ordered store of pool entries.
///
/// Insertion order is arrival order. Mutations are applied in call order and
/// are visible to `read`/`count` as soon as the call returns; any persistence
/// an implementation does happens behind that in-memory state.
pub trait PoolCache: Send + Sync {
    /// Append entries to the tail, evicting the oldest entries past capacity.
    ///
    /// Entries whose id is already cached are ignored.
    fn write(&self, entries: Vec<PoolEntry>);

    /// Return up to `count` entries from the head, oldest first.
    fn read(&self, count: usize) -> Vec<PoolEntry>;

    /// Remove every entry whose id is in `ids`. Unknown ids are ignored.
    fn remove(&self, ids: &HashSet<String>);

    /// Current number of cached entries.
    fn count(&self) -> usize;
}

/// Append `incoming` to `entries`, skipping duplicate ids, then trim the head
/// down to `max_count`. Returns `(appended, evicted)`.
pub(crate) fn append_bounded(
    entries: &mut VecDeque<PoolEntry>,
    incoming: Vec<PoolEntry>,
    max_count: usize,
) -> (usize, usize) {
    let mut known: HashSet<String> = entries.iter().map(|e| e.id().to_string()).collect();
    let mut appended = 0;

    for entry in incoming {
        if known.insert(entry.id().to_string()) {
            entries.push_back(entry);
            appended += 1;
        } else {
            debug!(id = %entry.id(), "Ignoring duplicate pool entry");
        }
    }

    let evicted = entries.len().saturating_sub(max_count);
    if evicted > 0 {
        entries.drain(..evicted);
    }

    (appended, evicted)
}

/// Remove entries by id, preserving survivor order. Returns the removed count.
pub(crate) fn remove_ids(entries: &mut VecDeque<PoolEntry>, ids: &HashSet<String>) -> usize {
    let before = entries.len();
    entries.retain(|entry| !ids.contains(entry.id()));
    before - entries.len()
}

/// Copy up to `count` entries from the head.
pub(crate) fn read_head(entries: &VecDeque<PoolEntry>, count: usize) -> Vec<PoolEntry> {
    entries.iter().take(count).cloned().collect()
}

/// Cache that lives only in memory. Used for tests and dry runs.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<VecDeque<PoolEntry>>,
    max_count: usize,
}

impl MemoryCache {
    /// Create an empty cache holding at most `max_count` entries.
    pub fn new(max_count: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_count: max_count.max(1),
        }
    }

    /// Ids of all cached entries, oldest first.
    pub fn ids(&self) -> Vec<String> {
        self.entries.lock().iter().map(|e| e.id().to_string()).collect()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_COUNT)
    }
}

impl PoolCache for MemoryCache {
    fn write(&self, entries: Vec<PoolEntry>) {
        if entries.is_empty() {
            return;
        }
        let mut guard = self.entries.lock();
        append_bounded(&mut guard, entries, self.max_count);
    }

    fn read(&self, count: usize) -> Vec<PoolEntry> {
        read_head(&self.entries.lock(), count)
    }

    fn remove(&self, ids: &HashSet<String>) {
        if ids.is_empty() {
            return;
        }
        remove_ids(&mut self.entries.lock(), ids);
    }

    fn count(&self) -> usize {
        self.entries.lock().len()
    }
}
