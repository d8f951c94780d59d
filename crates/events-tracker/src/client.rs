//! Client wiring: disk cache, HTTP shipper, pool and tracker built from `Config`.

use crate::{EventsTracker, TrackedEvent, TrackerConfig, TrackerError, TrackerResult};
use event_pool::{
    CacheStore, DiskCache, DiskCacheConfig, DispatchReport, EventPool, PoolConfig, PoolHandle,
};
use event_shipper::{HttpShipper, ShipmentFailure, ShipperConfig};
use events_config_and_utils::{Config, Paths};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

/// Owns the whole event pipeline for one host process.
pub struct EventsClient {
    tracker: EventsTracker,
    pool: EventPool,
    cache: Arc<DiskCache>,
    shipper: Arc<HttpShipper>,
    dispatch_loop: Mutex<Option<PoolHandle>>,
}

impl EventsClient {
    /// Build a client from configuration.
    ///
    /// Fails when no track id is configured or the collector URL is invalid.
    /// The cache file is not read until the first event or dispatch.
    pub fn new(config: &Config, paths: &Paths) -> TrackerResult<Self> {
        let track_id = config
            .track_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or(TrackerError::MissingTrackId)?;
        config.validate()?;

        let cache = Arc::new(DiskCache::new(
            CacheStore::new(paths.cache_file()),
            DiskCacheConfig {
                max_count: config.max_cache_count,
                persist_debounce: config.persist_debounce(),
            },
        ));

        let shipper = Arc::new(HttpShipper::new(ShipperConfig {
            base_url: config.collector_url.clone(),
            request_timeout: config.request_timeout(),
            max_event_age: config.max_event_age(),
            dry_run: config.dry_run,
        })?);

        let pool = EventPool::new(
            cache.clone(),
            shipper.clone(),
            PoolConfig {
                dispatch_interval: config.dispatch_interval(),
                dispatch_limit: config.dispatch_limit,
            },
        );

        let tracker = EventsTracker::new(TrackerConfig::new(track_id), pool.clone());

        info!(
            collector_url = %config.collector_url,
            cache_file = %paths.cache_file().display(),
            dry_run = config.dry_run,
            "Events client created"
        );

        Ok(Self {
            tracker,
            pool,
            cache,
            shipper,
            dispatch_loop: Mutex::new(None),
        })
    }

    /// Get the tracker.
    pub fn tracker(&self) -> &EventsTracker {
        &self.tracker
    }

    /// Get the pool.
    pub fn pool(&self) -> &EventPool {
        &self.pool
    }

    /// Track an event.
    pub fn track(
        &self,
        event_type: impl Into<String>,
        properties: Map<String, Value>,
    ) -> TrackerResult<Uuid> {
        self.tracker.track(event_type, properties)
    }

    /// Run one dispatch cycle now.
    pub async fn dispatch_now(&self) -> DispatchReport {
        self.pool.dispatch().await
    }

    /// Start the periodic dispatch loop.
    pub fn start(&self) -> TrackerResult<()> {
        let handle = self.pool.start()?;
        *self.dispatch_loop.lock() = Some(handle);
        Ok(())
    }

    /// Stop the periodic dispatch loop if it is running.
    pub async fn stop(&self) {
        let handle = self.dispatch_loop.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    /// Load the cache file off the async worker threads.
    ///
    /// Optional; without it the first track or dispatch reads the file.
    pub async fn hydrate(&self) {
        self.cache.hydrate().await;
    }

    /// Wait until the cache file reflects every change made so far.
    pub async fn flush(&self) {
        self.cache.flush().await;
    }

    /// Number of events waiting to be shipped.
    pub fn pending_count(&self) -> usize {
        self.pool.pending_count()
    }

    /// Subscribe to every tracked event.
    pub fn subscribe_tracked(&self) -> broadcast::Receiver<TrackedEvent> {
        self.tracker.subscribe()
    }

    /// Subscribe to per-event shipment failures.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<ShipmentFailure> {
        self.shipper.subscribe_failures()
    }
}

impl std::fmt::Debug for EventsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventsClient")
            .field("tracker", &self.tracker)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
