//! Event model.
//!
//! An [`Event`] serializes to the collector's payload shape:
//!
//! ```json
//! {
//!   "type": "app_open",
//!   "id": "2f0c...",
//!   "version": "1.0.0",
//!   "recordedAt": "2024-03-10T12:00:00.000Z",
//!   "client": { "id": "...", "trackId": "..." },
//!   "context": { "session": { "id": "..." }, "personId": ["legacy", "42"] },
//!   "properties": {}
//! }
//! ```

use crate::TrackerResult;
use chrono::{DateTime, Utc};
use event_pool::PoolEntry;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Payload schema version.
pub const EVENT_VERSION: &str = "1.0.0";

/// An id tagged with the system it comes from. Serialized as `[source, id]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdField {
    /// Source system, e.g. `legacy` or `graph`.
    pub source: String,
    /// The id within that system.
    pub id: String,
}

impl IdField {
    /// Create an id field.
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            id: id.into(),
        }
    }

    /// An id from the legacy API.
    pub fn legacy(id: impl Into<String>) -> Self {
        Self::new(id, "legacy")
    }

    /// An id from the graph API.
    pub fn graph(id: impl Into<String>) -> Self {
        Self::new(id, "graph")
    }
}

impl Serialize for IdField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [&self.source, &self.id].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for IdField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (source, id) = <(String, String)>::deserialize(deserializer)?;
        Ok(Self { source, id })
    }
}

/// Where the user currently is in the app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// Marketing campaign the session came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub id: String,
}

/// Context attached to an event. Absent parts are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_id: Option<IdField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<ViewContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign: Option<CampaignContext>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub id: String,
    pub track_id: String,
}

/// One tracked event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub id: Uuid,
    pub version: String,
    #[serde(with = "timestamp_millis")]
    pub recorded_at: DateTime<Utc>,
    pub client: ClientInfo,
    pub context: EventContext,
    pub properties: Map<String, Value>,
}

impl Event {
    /// Create an event recorded now, with a fresh id and empty context.
    pub fn new(event_type: impl Into<String>, client: ClientInfo, properties: Map<String, Value>) -> Self {
        Self {
            event_type: event_type.into(),
            id: Uuid::new_v4(),
            version: EVENT_VERSION.to_string(),
            recorded_at: Utc::now(),
            client,
            context: EventContext::default(),
            properties: sanitize_properties(properties),
        }
    }

    /// Set the context.
    pub fn with_context(mut self, context: EventContext) -> Self {
        self.context = context;
        self
    }

    /// Serialize into a pool entry keyed by the event id.
    pub fn to_entry(&self) -> TrackerResult<PoolEntry> {
        let payload = serde_json::to_vec(self)?;
        Ok(PoolEntry::new(self.id.to_string(), payload))
    }
}

/// Drop nested arrays and objects that end up empty. Scalars, including
/// nulls, are kept as they are.
pub fn sanitize_properties(properties: Map<String, Value>) -> Map<String, Value> {
    properties
        .into_iter()
        .filter_map(|(key, value)| sanitize_value(value).map(|value| (key, value)))
        .collect()
}

fn sanitize_value(value: Value) -> Option<Value> {
    match value {
        Value::Array(items) => {
            let items: Vec<Value> = items.into_iter().filter_map(sanitize_value).collect();
            (!items.is_empty()).then_some(Value::Array(items))
        }
        Value::Object(map) => {
            let map = sanitize_properties(map);
            (!map.is_empty()).then_some(Value::Object(map))
        }
        scalar => Some(scalar),
    }
}

mod timestamp_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn client() -> ClientInfo {
        ClientInfo {
            id: "client-1".to_string(),
            track_id: "track-1".to_string(),
        }
    }

    fn props(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn serializes_required_fields() {
        let mut event = Event::new("app_open", client(), Map::new());
        event.recorded_at = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "app_open");
        assert_eq!(value["id"], event.id.to_string());
        assert_eq!(value["version"], "1.0.0");
        assert_eq!(value["recordedAt"], "2024-03-10T12:00:00.000Z");
        assert_eq!(value["client"], json!({"id": "client-1", "trackId": "track-1"}));
        assert_eq!(value["context"], json!({}));
        assert_eq!(value["properties"], json!({}));
    }

    #[test]
    fn serializes_full_context() {
        let context = EventContext {
            session: Some(SessionContext {
                id: "session-1".to_string(),
            }),
            person_id: Some(IdField::legacy("42")),
            view: Some(ViewContext {
                path: Some(vec!["home".to_string(), "offers".to_string()]),
                previous_path: None,
                uri: Some("app://offers".to_string()),
            }),
            campaign: Some(CampaignContext {
                name: Some("spring".to_string()),
                ..Default::default()
            }),
        };
        let event = Event::new("screen_view", client(), Map::new()).with_context(context);

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value["context"],
            json!({
                "session": {"id": "session-1"},
                "personId": ["legacy", "42"],
                "view": {"path": ["home", "offers"], "uri": "app://offers"},
                "campaign": {"name": "spring"},
            })
        );
    }

    #[test]
    fn entry_round_trips_through_json() {
        let event = Event::new("search", client(), props(json!({"query": "coffee"})));
        let entry = event.to_entry().unwrap();

        assert_eq!(entry.id(), event.id.to_string());
        let decoded: Event = serde_json::from_slice(entry.payload()).unwrap();
        assert_eq!(decoded.id, event.id);
        assert_eq!(decoded.properties["query"], "coffee");
        assert_eq!(
            decoded.recorded_at.timestamp_millis(),
            event.recorded_at.timestamp_millis()
        );
    }

    #[test]
    fn sanitize_drops_empty_nested_containers() {
        let cleaned = sanitize_properties(props(json!({
            "count": 3,
            "nothing": null,
            "empty_list": [],
            "empty_map": {},
            "nested": {"inner": [], "deeper": {"x": {}}},
            "mixed": [1, [], {}, null, "a"],
        })));

        assert_eq!(
            Value::Object(cleaned),
            json!({
                "count": 3,
                "nothing": null,
                "mixed": [1, null, "a"],
            })
        );
    }

    #[test]
    fn id_field_deserializes_from_pair() {
        let id: IdField = serde_json::from_value(json!(["graph", "abc"])).unwrap();
        assert_eq!(id, IdField::graph("abc"));
    }
}
