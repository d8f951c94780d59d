//! Event pool: push, periodic dispatch and reconciliation.

use crate::{PoolCache, PoolEntry, PoolError, PoolResult, PoolShipper};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Default time between dispatch cycles.
pub const DEFAULT_DISPATCH_INTERVAL: Duration = Duration::from_secs(120);

/// Default maximum number of entries per dispatch.
pub const DEFAULT_DISPATCH_LIMIT: usize = 100;

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Interval of the dispatch timer. This is also the retry cadence.
    pub dispatch_interval: Duration,
    /// Maximum number of entries read from the cache head per dispatch.
    pub dispatch_limit: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            dispatch_interval: DEFAULT_DISPATCH_INTERVAL,
            dispatch_limit: DEFAULT_DISPATCH_LIMIT,
        }
    }
}

/// Outcome of one dispatch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchReport {
    /// Another dispatch was already in flight.
    Skipped,
    /// The cache was empty.
    Idle,
    /// A batch was handed to the shipper.
    Shipped {
        /// Entries in the batch.
        sent: usize,
        /// Entries of the batch removed from the cache afterwards.
        removed: usize,
    },
}

struct PoolInner {
    cache: Arc<dyn PoolCache>,
    shipper: Arc<dyn PoolShipper>,
    config: PoolConfig,
    in_flight: AtomicBool,
    started: AtomicBool,
}

/// Durable event pool.
///
/// Entries pushed into the pool are written to the cache immediately and
/// shipped in batches from the cache head, either on demand via
/// [`dispatch`](Self::dispatch) or on the timer started with
/// [`start`](Self::start). At most one dispatch is in flight at a time.
/// Cloning is cheap; all clones share the same cache, shipper and in-flight flag.
#[derive(Clone)]
pub struct EventPool {
    inner: Arc<PoolInner>,
}

impl EventPool {
    /// Create a pool over the given cache and shipper.
    pub fn new(cache: Arc<dyn PoolCache>, shipper: Arc<dyn PoolShipper>, config: PoolConfig) -> Self {
        let config = PoolConfig {
            dispatch_limit: config.dispatch_limit.max(1),
            ..config
        };

        Self {
            inner: Arc::new(PoolInner {
                cache,
                shipper,
                config,
                in_flight: AtomicBool::new(false),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Get the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Get the underlying cache.
    pub fn cache(&self) -> &Arc<dyn PoolCache> {
        &self.inner.cache
    }

    /// Add entries to the pool. Returns once they are in the cache.
    pub fn push(&self, entries: Vec<PoolEntry>) {
        if entries.is_empty() {
            return;
        }
        debug!(count = entries.len(), "Pushing entries into pool");
        self.inner.cache.write(entries);
    }

    /// Number of entries waiting to be shipped.
    pub fn pending_count(&self) -> usize {
        self.inner.cache.count()
    }

    /// Whether a dispatch is currently in flight.
    pub fn is_dispatching(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Run one dispatch cycle.
    pub async fn dispatch(&self) -> DispatchReport {
        let Some(_guard) = InFlightGuard::acquire(&self.inner.in_flight) else {
            debug!("Dispatch already in flight, skipping");
            return DispatchReport::Skipped;
        };

        let batch = self.inner.cache.read(self.inner.config.dispatch_limit);
        if batch.is_empty() {
            return DispatchReport::Idle;
        }

        let sent = batch.len();
        let batch_ids: HashSet<String> = batch.iter().map(|e| e.id().to_string()).collect();
        debug!(count = sent, "Dispatching batch");

        let removable = self.inner.shipper.ship(batch).await;
        let removed = removable.intersection(&batch_ids).count();
        self.inner.cache.remove(&removable);

        info!(
            sent,
            removed,
            kept = sent - removed,
            pending = self.inner.cache.count(),
            "Dispatch complete"
        );
        DispatchReport::Shipped { sent, removed }
    }

    /// Start the dispatch timer.
    ///
    /// Each tick spawns a dispatch; ticks that arrive while one is still in
    /// flight are skipped. The first dispatch happens one interval after start.
    /// Must be called from within a Tokio runtime. Dropping the returned handle
    /// also stops the loop.
    pub fn start(&self) -> PoolResult<PoolHandle> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(PoolError::AlreadyStarted);
        }

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
        let pool = self.clone();
        let period = self.inner.config.dispatch_interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            info!(interval_secs = period.as_secs_f64(), "Dispatch loop started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if pool.is_dispatching() {
                            debug!("Dispatch still in flight, skipping tick");
                            continue;
                        }
                        let pool = pool.clone();
                        tokio::spawn(async move {
                            pool.dispatch().await;
                        });
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            pool.inner.started.store(false, Ordering::SeqCst);
            info!("Dispatch loop stopped");
        });

        Ok(PoolHandle {
            shutdown: shutdown_tx,
            task,
        })
    }
}

impl std::fmt::Debug for EventPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPool")
            .field("config", &self.inner.config)
            .field("in_flight", &self.is_dispatching())
            .finish_non_exhaustive()
    }
}

/// Handle to a running dispatch loop.
#[derive(Debug)]
pub struct PoolHandle {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl PoolHandle {
    /// Stop the dispatch loop and wait for it to exit.
    ///
    /// A dispatch already in flight is not cancelled.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.task.await;
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Clears the in-flight flag when the dispatch ends, including when the
/// dispatch future is dropped mid-flight.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryCache;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Semaphore;

    /// Records every batch and acks the ids it was told to.
    #[derive(Default)]
    struct RecordingShipper {
        batches: Mutex<Vec<Vec<String>>>,
        ack_all: bool,
    }

    impl RecordingShipper {
        fn acking() -> Self {
            Self {
                ack_all: true,
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.batches.lock().len()
        }
    }

    #[async_trait]
    impl PoolShipper for RecordingShipper {
        async fn ship(&self, batch: Vec<PoolEntry>) -> HashSet<String> {
            let ids: Vec<String> = batch.iter().map(|e| e.id().to_string()).collect();
            self.batches.lock().push(ids.clone());
            if self.ack_all {
                ids.into_iter().collect()
            } else {
                HashSet::new()
            }
        }
    }

    /// Blocks inside `ship` until a permit is released.
    struct GatedShipper {
        calls: AtomicUsize,
        gate: Semaphore,
    }

    impl GatedShipper {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                gate: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl PoolShipper for GatedShipper {
        async fn ship(&self, _batch: Vec<PoolEntry>) -> HashSet<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            HashSet::new()
        }
    }

    fn entries(ids: &[&str]) -> Vec<PoolEntry> {
        ids.iter().map(|id| PoolEntry::new(*id, b"{}".to_vec())).collect()
    }

    fn pool_with(shipper: Arc<dyn PoolShipper>, config: PoolConfig) -> EventPool {
        EventPool::new(Arc::new(MemoryCache::new(100)), shipper, config)
    }

    #[tokio::test]
    async fn dispatch_ships_and_removes_acked() {
        let shipper = Arc::new(RecordingShipper::acking());
        let pool = pool_with(shipper.clone(), PoolConfig::default());

        pool.push(entries(&["a", "b", "c"]));
        assert_eq!(pool.pending_count(), 3);

        let report = pool.dispatch().await;
        assert_eq!(report, DispatchReport::Shipped { sent: 3, removed: 3 });
        assert_eq!(pool.pending_count(), 0);
        assert_eq!(shipper.batches.lock()[0], vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn dispatch_on_empty_pool_is_idle() {
        let shipper = Arc::new(RecordingShipper::acking());
        let pool = pool_with(shipper.clone(), PoolConfig::default());

        assert_eq!(pool.dispatch().await, DispatchReport::Idle);
        assert_eq!(shipper.calls(), 0);
    }

    #[tokio::test]
    async fn dispatch_respects_limit() {
        let shipper = Arc::new(RecordingShipper::acking());
        let pool = pool_with(
            shipper.clone(),
            PoolConfig {
                dispatch_limit: 2,
                ..Default::default()
            },
        );

        pool.push(entries(&["a", "b", "c"]));
        assert_eq!(pool.dispatch().await, DispatchReport::Shipped { sent: 2, removed: 2 });
        assert_eq!(pool.dispatch().await, DispatchReport::Shipped { sent: 1, removed: 1 });
        assert_eq!(pool.dispatch().await, DispatchReport::Idle);

        let batches = shipper.batches.lock().clone();
        assert_eq!(batches, vec![vec!["a", "b"], vec!["c"]]);
    }

    #[tokio::test]
    async fn unreturned_ids_stay_for_retry() {
        let shipper = Arc::new(RecordingShipper::default());
        let pool = pool_with(shipper.clone(), PoolConfig::default());

        pool.push(entries(&["a", "b"]));
        assert_eq!(pool.dispatch().await, DispatchReport::Shipped { sent: 2, removed: 0 });
        assert_eq!(pool.dispatch().await, DispatchReport::Shipped { sent: 2, removed: 0 });
        assert_eq!(pool.pending_count(), 2);
        assert_eq!(shipper.calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_dispatch_is_skipped() {
        let shipper = Arc::new(GatedShipper::new());
        let pool = pool_with(shipper.clone(), PoolConfig::default());
        pool.push(entries(&["a"]));

        let first = tokio::spawn({
            let pool = pool.clone();
            async move { pool.dispatch().await }
        });
        while shipper.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        assert!(pool.is_dispatching());
        assert_eq!(pool.dispatch().await, DispatchReport::Skipped);
        assert_eq!(pool.dispatch().await, DispatchReport::Skipped);

        shipper.gate.add_permits(1);
        let report = first.await.unwrap();
        assert_eq!(report, DispatchReport::Shipped { sent: 1, removed: 0 });
        assert!(!pool.is_dispatching());
        assert_eq!(shipper.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_dispatch_clears_in_flight_flag() {
        let shipper = Arc::new(GatedShipper::new());
        let pool = pool_with(shipper.clone(), PoolConfig::default());
        pool.push(entries(&["a"]));

        let stuck = tokio::spawn({
            let pool = pool.clone();
            async move { pool.dispatch().await }
        });
        while shipper.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        stuck.abort();
        let _ = stuck.await;

        assert!(!pool.is_dispatching());
        shipper.gate.add_permits(1);
        assert_eq!(pool.dispatch().await, DispatchReport::Shipped { sent: 1, removed: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn timer_dispatches_every_interval() {
        let shipper = Arc::new(RecordingShipper::default());
        let pool = pool_with(
            shipper.clone(),
            PoolConfig {
                dispatch_interval: Duration::from_secs(10),
                ..Default::default()
            },
        );
        pool.push(entries(&["a"]));

        let handle = pool.start().unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(shipper.calls(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(shipper.calls(), 3);

        handle.stop().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(shipper.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_during_slow_dispatch_are_skipped() {
        let shipper = Arc::new(GatedShipper::new());
        let pool = pool_with(
            shipper.clone(),
            PoolConfig {
                dispatch_interval: Duration::from_secs(10),
                ..Default::default()
            },
        );
        pool.push(entries(&["a"]));

        let handle = pool.start().unwrap();
        tokio::time::sleep(Duration::from_secs(55)).await;
        assert_eq!(shipper.calls.load(Ordering::SeqCst), 1);

        shipper.gate.add_permits(1);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(shipper.calls.load(Ordering::SeqCst), 2);

        shipper.gate.add_permits(10);
        handle.stop().await;
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let pool = pool_with(Arc::new(RecordingShipper::default()), PoolConfig::default());

        let handle = pool.start().unwrap();
        assert!(matches!(pool.start(), Err(PoolError::AlreadyStarted)));

        handle.stop().await;
        let restarted = pool.start().unwrap();
        restarted.stop().await;
    }
}
