//! Disk-backed pool cache with coalesced persistence.
//!
//! The in-memory sequence is authoritative. Every mutation bumps a generation
//! counter and asks for a persist; at most one writer task runs at a time. The
//! writer waits out the debounce window, snapshots the sequence, writes it on
//! the blocking pool and then re-checks the generation, looping until no newer
//! mutation arrived while it was writing. The file is therefore rewritten
//! about once per debounce window no matter how many mutations happen, and its
//! final content always converges on the final in-memory state.

use crate::cache::{append_bounded, read_head, remove_ids};
use crate::{CacheStore, PoolCache, PoolEntry, DEFAULT_MAX_COUNT};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Default delay between a mutation and the disk write that captures it.
pub const DEFAULT_PERSIST_DEBOUNCE: Duration = Duration::from_millis(200);

/// Disk cache configuration.
#[derive(Debug, Clone)]
pub struct DiskCacheConfig {
    /// Maximum number of cached entries.
    pub max_count: usize,
    /// How long the writer waits before snapshotting the cache.
    pub persist_debounce: Duration,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            max_count: DEFAULT_MAX_COUNT,
            persist_debounce: DEFAULT_PERSIST_DEBOUNCE,
        }
    }
}

struct CacheState {
    entries: VecDeque<PoolEntry>,
    hydrated: bool,
    /// Bumped on every mutation that changed `entries`.
    generation: u64,
    /// True while a writer task owns persistence.
    writer_active: bool,
}

struct Shared {
    store: CacheStore,
    config: DiskCacheConfig,
    state: Mutex<CacheState>,
    /// Generation of the most recent write attempt, successful or not.
    attempted: watch::Sender<u64>,
    disk_writes: AtomicU64,
    runtime: Option<Handle>,
}

/// Pool cache mirrored to a single file on disk.
///
/// The file is read lazily on first access; a missing or corrupt file yields
/// an empty cache. Disk failures are logged and otherwise ignored, the next
/// successful write catches the file up.
#[derive(Clone)]
pub struct DiskCache {
    shared: Arc<Shared>,
}

impl DiskCache {
    /// Create a disk cache, persisting on the current Tokio runtime if there is one.
    ///
    /// Outside a runtime every mutation is written to disk inline.
    pub fn new(store: CacheStore, config: DiskCacheConfig) -> Self {
        Self::build(store, config, Handle::try_current().ok())
    }

    /// Create a disk cache that persists on the given runtime.
    pub fn with_runtime(store: CacheStore, config: DiskCacheConfig, runtime: Handle) -> Self {
        Self::build(store, config, Some(runtime))
    }

    fn build(store: CacheStore, config: DiskCacheConfig, runtime: Option<Handle>) -> Self {
        let (attempted, _) = watch::channel(0);
        let config = DiskCacheConfig {
            max_count: config.max_count.max(1),
            ..config
        };

        Self {
            shared: Arc::new(Shared {
                store,
                config,
                state: Mutex::new(CacheState {
                    entries: VecDeque::new(),
                    hydrated: false,
                    generation: 0,
                    writer_active: false,
                }),
                attempted,
                disk_writes: AtomicU64::new(0),
                runtime,
            }),
        }
    }

    /// Get the backing store.
    pub fn store(&self) -> &CacheStore {
        &self.shared.store
    }

    /// Number of physical writes made to the cache file so far.
    pub fn disk_writes(&self) -> u64 {
        self.shared.disk_writes.load(Ordering::SeqCst)
    }

    /// Read the cache file on the blocking pool so that no later access has to.
    ///
    /// Does nothing once the cache is hydrated. If the read task fails the
    /// cache falls back to hydrating on first access.
    pub async fn hydrate(&self) {
        if self.shared.state.lock().hydrated {
            return;
        }

        let shared = self.shared.clone();
        let loaded = match tokio::task::spawn_blocking(move || shared.store.load()).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %e, "Event cache hydration task failed");
                return;
            }
        };

        let mut state = self.shared.state.lock();
        if !state.hydrated {
            self.shared.install(&mut state, loaded);
        }
    }

    /// Wait until the file reflects every mutation made before this call.
    ///
    /// Returns immediately when no write is pending. If the last write failed
    /// this still returns once the writer has given up; the in-memory state is
    /// unaffected.
    pub async fn flush(&self) {
        let target = {
            let state = self.shared.lock_state();
            if !state.writer_active {
                return;
            }
            state.generation
        };

        let mut attempted = self.shared.attempted.subscribe();
        loop {
            if *attempted.borrow_and_update() >= target {
                return;
            }
            if attempted.changed().await.is_err() {
                return;
            }
        }
    }

    /// Apply a mutation under the state lock and request a persist if it changed anything.
    fn mutate(&self, apply: impl FnOnce(&mut VecDeque<PoolEntry>) -> bool) {
        let start_writer = {
            let mut state = self.shared.lock_state();
            if !apply(&mut state.entries) {
                return;
            }
            state.generation += 1;

            if self.shared.runtime.is_none() {
                false
            } else if state.writer_active {
                debug!(generation = state.generation, "Persist already in flight, coalescing");
                false
            } else {
                state.writer_active = true;
                true
            }
        };

        match &self.shared.runtime {
            Some(runtime) if start_writer => {
                let shared = self.shared.clone();
                runtime.spawn(async move { shared.run_writer().await });
            }
            Some(_) => {}
            None => self.shared.persist_inline(),
        }
    }
}

impl Shared {
    /// Lock the state, hydrating it from disk on first access.
    ///
    /// Without a prior [`DiskCache::hydrate`] the first access reads the file
    /// while holding the lock.
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        let mut state = self.state.lock();
        if !state.hydrated {
            let loaded = self.store.load();
            self.install(&mut state, loaded);
        }
        state
    }

    fn install(&self, state: &mut CacheState, loaded: Vec<PoolEntry>) {
        let mut entries = VecDeque::new();
        let (appended, evicted) = append_bounded(&mut entries, loaded, self.config.max_count);
        state.entries = entries;
        state.hydrated = true;
        info!(
            path = %self.store.path().display(),
            count = appended - evicted,
            "Hydrated event cache"
        );
    }

    async fn run_writer(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.config.persist_debounce).await;

            let (snapshot, generation) = {
                let state = self.state.lock();
                (state.entries.clone(), state.generation)
            };

            let shared = self.clone();
            let count = snapshot.len();
            match tokio::task::spawn_blocking(move || shared.store.save(&snapshot)).await {
                Ok(Ok(())) => {
                    self.disk_writes.fetch_add(1, Ordering::SeqCst);
                    debug!(generation, count, "Persisted event cache");
                }
                Ok(Err(e)) => {
                    warn!(generation, error = %e, "Failed to persist event cache");
                }
                Err(e) => {
                    warn!(generation, error = %e, "Event cache writer task failed");
                }
            }
            self.attempted.send_replace(generation);

            let mut state = self.state.lock();
            if state.generation == generation {
                state.writer_active = false;
                return;
            }
            debug!(
                persisted = generation,
                current = state.generation,
                "Cache changed during persist, writing again"
            );
        }
    }

    fn persist_inline(&self) {
        let (snapshot, generation) = {
            let state = self.state.lock();
            (state.entries.clone(), state.generation)
        };

        match self.store.save(&snapshot) {
            Ok(()) => {
                self.disk_writes.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                warn!(generation, error = %e, "Failed to persist event cache");
            }
        }
        self.attempted.send_replace(generation);
    }
}

impl PoolCache for DiskCache {
    fn write(&self, entries: Vec<PoolEntry>) {
        if entries.is_empty() {
            return;
        }
        let max_count = self.shared.config.max_count;
        self.mutate(|cached| {
            let (appended, evicted) = append_bounded(cached, entries, max_count);
            if evicted > 0 {
                debug!(evicted, "Evicted oldest entries past cache capacity");
            }
            appended > 0 || evicted > 0
        });
    }

    fn read(&self, count: usize) -> Vec<PoolEntry> {
        read_head(&self.shared.lock_state().entries, count)
    }

    fn remove(&self, ids: &HashSet<String>) {
        if ids.is_empty() {
            return;
        }
        self.mutate(|cached| remove_ids(cached, ids) > 0);
    }

    fn count(&self) -> usize {
        self.shared.lock_state().entries.len()
    }
}

impl std::fmt::Debug for DiskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskCache")
            .field("path", &self.shared.store.path())
            .field("max_count", &self.shared.config.max_count)
            .finish_non_exhaustive()
    }
}
