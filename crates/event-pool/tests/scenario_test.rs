//! End-to-end pool scenarios over a disk cache and a scripted shipper.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use event_pool::{
    CacheStore, DiskCache, DiskCacheConfig, DispatchReport, EventPool, PoolCache, PoolConfig,
    PoolEntry, PoolShipper, ShipmentFailure,
};
use parking_lot::Mutex;
use serde_json::json;

/// What the scripted shipper does on its next call.
enum Step {
    /// Remove these ids.
    Ack(Vec<&'static str>),
    /// Transport failure: nothing removable.
    Fail,
    /// Remove these ids and report each as a failure.
    Drop(Vec<&'static str>),
}

#[derive(Default)]
struct ScriptedShipper {
    steps: Mutex<VecDeque<Step>>,
    batches: Mutex<Vec<Vec<String>>>,
    failures: Mutex<Vec<ShipmentFailure>>,
}

impl ScriptedShipper {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl PoolShipper for ScriptedShipper {
    async fn ship(&self, batch: Vec<PoolEntry>) -> HashSet<String> {
        self.batches
            .lock()
            .push(batch.iter().map(|e| e.id().to_string()).collect());

        match self.steps.lock().pop_front() {
            Some(Step::Ack(ids)) => ids.into_iter().map(String::from).collect(),
            Some(Step::Drop(ids)) => {
                let mut failures = self.failures.lock();
                for id in &ids {
                    failures.push(ShipmentFailure {
                        status: "nack".to_string(),
                        response: json!({"id": id, "status": "nack"}),
                        event: json!({"id": id}),
                        removing_from_cache: true,
                    });
                }
                ids.into_iter().map(String::from).collect()
            }
            Some(Step::Fail) | None => HashSet::new(),
        }
    }
}

fn entry(id: &str) -> PoolEntry {
    PoolEntry::new(id, json!({"id": id, "type": "test"}).to_string().into_bytes())
}

fn ids_of(cache: &dyn PoolCache) -> Vec<String> {
    cache.read(usize::MAX).iter().map(|e| e.id().to_string()).collect()
}

#[tokio::test]
async fn capacity_ack_failure_and_stale_nack() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events_pool.json");
    let cache = Arc::new(DiskCache::new(
        CacheStore::new(&path),
        DiskCacheConfig {
            max_count: 2,
            persist_debounce: Duration::from_millis(10),
        },
    ));
    let shipper = Arc::new(ScriptedShipper::new(vec![
        Step::Ack(vec!["b"]),
        Step::Fail,
        Step::Drop(vec!["c"]),
    ]));
    let pool = EventPool::new(cache.clone(), shipper.clone(), PoolConfig::default());

    pool.push(vec![entry("a"), entry("b"), entry("c")]);
    assert_eq!(ids_of(cache.as_ref()), vec!["b", "c"]);

    assert_eq!(pool.dispatch().await, DispatchReport::Shipped { sent: 2, removed: 1 });
    assert_eq!(ids_of(cache.as_ref()), vec!["c"]);

    assert_eq!(pool.dispatch().await, DispatchReport::Shipped { sent: 1, removed: 0 });
    assert_eq!(ids_of(cache.as_ref()), vec!["c"]);

    assert_eq!(pool.dispatch().await, DispatchReport::Shipped { sent: 1, removed: 1 });
    assert_eq!(pool.pending_count(), 0);

    let failures = shipper.failures.lock().clone();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].removing_from_cache);
    assert_eq!(failures[0].event_id(), Some("c"));

    cache.flush().await;
    assert!(CacheStore::new(&path).load().is_empty());
}

#[tokio::test]
async fn pending_entries_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events_pool.json");
    let config = DiskCacheConfig {
        max_count: 10,
        persist_debounce: Duration::from_millis(10),
    };

    {
        let cache = Arc::new(DiskCache::new(CacheStore::new(&path), config.clone()));
        let shipper = Arc::new(ScriptedShipper::new(vec![Step::Ack(vec!["a"])]));
        let pool = EventPool::new(cache.clone(), shipper, PoolConfig::default());

        pool.push(vec![entry("a"), entry("b"), entry("c")]);
        pool.dispatch().await;
        cache.flush().await;
    }

    let cache = Arc::new(DiskCache::new(CacheStore::new(&path), config));
    let shipper = Arc::new(ScriptedShipper::new(vec![Step::Ack(vec!["b", "c"])]));
    let pool = EventPool::new(cache.clone(), shipper.clone(), PoolConfig::default());

    assert_eq!(pool.pending_count(), 2);
    assert_eq!(pool.dispatch().await, DispatchReport::Shipped { sent: 2, removed: 2 });
    assert_eq!(shipper.batches.lock()[0], vec!["b", "c"]);
}
