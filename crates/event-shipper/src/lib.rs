//! HTTP shipper for the event pool.
//!
//! This crate provides:
//! - HttpShipper: posts a batch to `{base_url}/track` and reconciles the per-event response
//! - ShipperConfig: collector URL, timeout, max event age and dry-run switch
//! - reconcile: pure ack/nack/poison-batch interpretation of a collector response

mod config;
mod error;
mod http;
mod reconcile;

pub use config::{ShipperConfig, DEFAULT_COLLECTOR_URL, DEFAULT_MAX_EVENT_AGE, DEFAULT_REQUEST_TIMEOUT};
pub use error::{ShipperError, ShipperResult};
pub use event_pool::ShipmentFailure;
pub use http::HttpShipper;
pub use reconcile::{format_timestamp, prepare_batch, reconcile, PreparedBatch, Reconciliation};
