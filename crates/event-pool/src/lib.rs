//! Durable event pool for client-side telemetry.
//!
//! This crate provides:
//! - PoolCache: bounded, ordered cache of serialized entries (disk-backed or in-memory)
//! - CacheStore: atomic single-file persistence for the disk cache
//! - PoolShipper: contract for shipping a batch and reporting removable ids
//! - EventPool: push/dispatch orchestration with a single in-flight dispatch

mod cache;
mod disk_cache;
mod entry;
mod error;
mod pool;
mod shipper;
mod store;

pub use cache::{MemoryCache, PoolCache, DEFAULT_MAX_COUNT};
pub use disk_cache::{DiskCache, DiskCacheConfig, DEFAULT_PERSIST_DEBOUNCE};
pub use entry::PoolEntry;
pub use error::{PoolError, PoolResult};
pub use pool::{
    DispatchReport, EventPool, PoolConfig, PoolHandle, DEFAULT_DISPATCH_INTERVAL,
    DEFAULT_DISPATCH_LIMIT,
};
pub use shipper::{PoolShipper, ShipmentFailure};
pub use store::CacheStore;
