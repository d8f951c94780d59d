//! Batch preparation and response reconciliation.
//!
//! Both halves are pure so the collector protocol can be tested without a
//! server: [`prepare_batch`] turns pool entries into the request events and
//! [`reconcile`] turns a 2xx response body into a removal set plus failure
//! notifications.

use chrono::{DateTime, SecondsFormat, Utc};
use event_pool::{PoolEntry, ShipmentFailure};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, warn};

const STATUS_ACK: &str = "ack";
const STATUS_NACK: &str = "nack";

/// Format a timestamp as ISO-8601 UTC with millisecond precision.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Events ready to be posted.
#[derive(Debug, Default)]
pub struct PreparedBatch {
    /// Events in batch order, each stamped with `sentAt`.
    pub events: Vec<Value>,
    /// The same events keyed by pool entry id.
    pub by_id: HashMap<String, Value>,
    /// Ids whose payload is not a JSON object. These are never retried.
    pub unserializable: HashSet<String>,
}

impl PreparedBatch {
    /// Ids of every entry in the batch, serializable or not.
    pub fn all_ids(&self) -> HashSet<String> {
        self.by_id
            .keys()
            .chain(self.unserializable.iter())
            .cloned()
            .collect()
    }
}

/// Parse each entry payload as a JSON object and stamp it with `sentAt`.
pub fn prepare_batch(batch: Vec<PoolEntry>, sent_at: DateTime<Utc>) -> PreparedBatch {
    let sent_at = format_timestamp(sent_at);
    let mut prepared = PreparedBatch::default();

    for entry in batch {
        let (id, payload) = entry.into_parts();
        match serde_json::from_slice::<Map<String, Value>>(&payload) {
            Ok(mut event) => {
                event.insert("sentAt".to_string(), Value::String(sent_at.clone()));
                let event = Value::Object(event);
                prepared.events.push(event.clone());
                prepared.by_id.insert(id, event);
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Dropping unserializable event");
                prepared.unserializable.insert(id);
            }
        }
    }

    prepared
}

/// Outcome of reconciling one collector response.
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Ids to remove from the cache.
    pub remove: HashSet<String>,
    /// Per-event failures to notify.
    pub failures: Vec<ShipmentFailure>,
}

#[derive(Debug, Deserialize)]
struct TrackResponse {
    events: Vec<Value>,
}

/// Interpret a 2xx collector response.
///
/// Returns an error when the body does not decode; the caller then drops the
/// whole batch. Response items without an `id` or `status`, or whose id was
/// not part of `sent`, are ignored and their entries stay cached.
pub fn reconcile(
    body: &[u8],
    sent: &HashMap<String, Value>,
    now: DateTime<Utc>,
    max_event_age: Duration,
) -> Result<Reconciliation, serde_json::Error> {
    let response: TrackResponse = serde_json::from_slice(body)?;
    let mut result = Reconciliation::default();

    for item in response.events {
        let (Some(id), Some(status)) = (
            item.get("id").and_then(Value::as_str),
            item.get("status").and_then(Value::as_str),
        ) else {
            debug!(item = %item, "Ignoring response item without id or status");
            continue;
        };

        let Some(event) = sent.get(id) else {
            debug!(id = %id, "Ignoring response item for unknown event");
            continue;
        };

        match status {
            STATUS_ACK => {
                result.remove.insert(id.to_string());
            }
            STATUS_NACK => {
                let stale = is_stale(event, now, max_event_age);
                if stale {
                    result.remove.insert(id.to_string());
                }
                result.failures.push(ShipmentFailure {
                    status: status.to_string(),
                    response: item.clone(),
                    event: event.clone(),
                    removing_from_cache: stale,
                });
            }
            _ => {
                result.remove.insert(id.to_string());
                result.failures.push(ShipmentFailure {
                    status: status.to_string(),
                    response: item.clone(),
                    event: event.clone(),
                    removing_from_cache: true,
                });
            }
        }
    }

    Ok(result)
}

/// Whether the event's `recordedAt` is older than `max_age`.
///
/// A missing or unparseable timestamp counts as fresh, and so does any event
/// when `max_age` reaches past the representable time range.
fn is_stale(event: &Value, now: DateTime<Utc>, max_age: Duration) -> bool {
    let Some(recorded_at) = event
        .get("recordedAt")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    else {
        return false;
    };

    chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|max_age| now.checked_sub_signed(max_age))
        .is_some_and(|cutoff| recorded_at.with_timezone(&Utc) < cutoff)
}
