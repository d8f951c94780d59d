//! HTTP shipper posting batches to the collector's track endpoint.

use crate::reconcile::{prepare_batch, reconcile};
use crate::{ShipmentFailure, ShipperConfig, ShipperResult};
use async_trait::async_trait;
use chrono::Utc;
use event_pool::{PoolEntry, PoolShipper};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

/// Capacity of the failure notification channel.
const FAILURE_CHANNEL_CAPACITY: usize = 100;

const APPLICATION_JSON: &str = "application/json";

#[derive(Debug, Serialize)]
struct TrackRequest<'a> {
    events: &'a [Value],
}

/// Ships pool batches to `{base_url}/track`.
///
/// Transport errors and non-2xx statuses keep the batch for the next
/// dispatch. A 2xx response is reconciled per event; a 2xx response that does
/// not decode drops the whole batch so a poisoned batch cannot block the pool.
pub struct HttpShipper {
    config: ShipperConfig,
    client: Client,
    track_url: Url,
    failures: broadcast::Sender<ShipmentFailure>,
}

impl HttpShipper {
    /// Create a new HTTP shipper.
    pub fn new(config: ShipperConfig) -> ShipperResult<Self> {
        let track_url = config.track_url()?;
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);

        Ok(Self {
            config,
            client,
            track_url,
            failures,
        })
    }

    /// Get the shipper configuration.
    pub fn config(&self) -> &ShipperConfig {
        &self.config
    }

    /// Subscribe to per-event failure notifications.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<ShipmentFailure> {
        self.failures.subscribe()
    }

    /// Post events and return the raw body of a 2xx response.
    async fn post(&self, events: &[Value]) -> ShipperResult<Vec<u8>> {
        let response = self
            .client
            .post(self.track_url.clone())
            .header(CONTENT_TYPE, APPLICATION_JSON)
            .header(ACCEPT, APPLICATION_JSON)
            .json(&TrackRequest { events })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(crate::ShipperError::Status(status.as_u16()));
        }

        Ok(response.bytes().await?.to_vec())
    }

    fn notify(&self, failure: ShipmentFailure) {
        warn!(
            id = failure.event_id().unwrap_or_default(),
            status = %failure.status,
            removing_from_cache = failure.removing_from_cache,
            "Collector rejected event"
        );
        // No subscribers is fine.
        let _ = self.failures.send(failure);
    }
}

#[async_trait]
impl PoolShipper for HttpShipper {
    async fn ship(&self, batch: Vec<PoolEntry>) -> HashSet<String> {
        let prepared = prepare_batch(batch, Utc::now());
        let mut remove = prepared.unserializable.clone();

        if self.config.dry_run {
            info!(count = prepared.events.len(), "Dry run, reporting batch as shipped");
            return prepared.all_ids();
        }

        if prepared.events.is_empty() {
            return remove;
        }

        let body = match self.post(&prepared.events).await {
            Ok(body) => body,
            Err(e) => {
                warn!(
                    count = prepared.events.len(),
                    error = %e,
                    "Failed to ship events, keeping them for retry"
                );
                return remove;
            }
        };

        match reconcile(&body, &prepared.by_id, Utc::now(), self.config.max_event_age) {
            Ok(result) => {
                debug!(
                    sent = prepared.events.len(),
                    removed = result.remove.len(),
                    failures = result.failures.len(),
                    "Reconciled collector response"
                );
                remove.extend(result.remove);
                for failure in result.failures {
                    self.notify(failure);
                }
            }
            Err(e) => {
                warn!(
                    count = prepared.events.len(),
                    error = %e,
                    "Undecodable collector response, dropping batch"
                );
                remove.extend(prepared.by_id.into_keys());
            }
        }

        remove
    }
}

impl std::fmt::Debug for HttpShipper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpShipper")
            .field("track_url", &self.track_url.as_str())
            .field("dry_run", &self.config.dry_run)
            .finish_non_exhaustive()
    }
}
