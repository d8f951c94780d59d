//! Shipper contract.

use crate::PoolEntry;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;

/// Sends a batch of pool entries to the collector.
///
/// The future resolving is the completion signal. Implementations must resolve
/// on every path (including transport failure) and must not panic on bad
/// payloads; an entry that cannot be serialized belongs in the returned set.
#[async_trait]
pub trait PoolShipper: Send + Sync {
    /// Ship a batch and return the ids that should be removed from the cache.
    ///
    /// Ids not in the returned set stay cached and are retried on a later
    /// dispatch.
    async fn ship(&self, batch: Vec<PoolEntry>) -> HashSet<String>;
}

/// A per-event failure reported by the collector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShipmentFailure {
    /// Status string from the response item, e.g. `nack`.
    pub status: String,
    /// The response item as received.
    pub response: serde_json::Value,
    /// The event as it was sent.
    pub event: serde_json::Value,
    /// Whether the event was dropped from the cache as a result.
    pub removing_from_cache: bool,
}

impl ShipmentFailure {
    /// Id of the failed event, if the event carries one.
    pub fn event_id(&self) -> Option<&str> {
        self.event.get("id").and_then(|id| id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_id_reads_from_event() {
        let failure = ShipmentFailure {
            status: "nack".to_string(),
            response: json!({"id": "e1", "status": "nack"}),
            event: json!({"id": "e1", "type": "app_open"}),
            removing_from_cache: false,
        };
        assert_eq!(failure.event_id(), Some("e1"));

        let anonymous = ShipmentFailure {
            event: json!({}),
            ..failure
        };
        assert_eq!(anonymous.event_id(), None);
    }
}
