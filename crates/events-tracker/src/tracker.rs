//! Events tracker.

use crate::{
    CampaignContext, ClientInfo, Event, EventContext, IdField, SessionContext, TrackerError,
    TrackerResult, ViewContext,
};
use event_pool::EventPool;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Capacity of the tracked-event notification channel.
const TRACKED_CHANNEL_CAPACITY: usize = 256;

/// Tracker identity.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Track id stamped on every event.
    pub track_id: String,
    /// Id of this client installation.
    pub client_id: String,
    /// Id of the current session.
    pub session_id: String,
}

impl TrackerConfig {
    /// Create a config with fresh client and session ids.
    pub fn new(track_id: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            client_id: Uuid::new_v4().to_string(),
            session_id: Uuid::new_v4().to_string(),
        }
    }
}

/// Notification sent for every tracked event.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEvent {
    pub event_type: String,
    pub id: Uuid,
    pub properties: Map<String, Value>,
    pub view: Option<ViewContext>,
    pub person_id: Option<String>,
}

#[derive(Debug, Default)]
struct TrackerContext {
    view: Option<ViewContext>,
    campaign: Option<CampaignContext>,
    person_id: Option<IdField>,
}

/// Builds events and pushes them into the pool.
///
/// Context set through [`update_view`](Self::update_view),
/// [`update_campaign`](Self::update_campaign) and
/// [`set_person_id`](Self::set_person_id) is attached to every event tracked
/// afterwards. Tracking never waits for the network or the disk.
pub struct EventsTracker {
    config: TrackerConfig,
    pool: EventPool,
    context: RwLock<TrackerContext>,
    tracked: broadcast::Sender<TrackedEvent>,
}

impl EventsTracker {
    /// Create a tracker pushing into `pool`.
    pub fn new(config: TrackerConfig, pool: EventPool) -> Self {
        let (tracked, _) = broadcast::channel(TRACKED_CHANNEL_CAPACITY);
        Self {
            config,
            pool,
            context: RwLock::new(TrackerContext::default()),
            tracked,
        }
    }

    /// Get the tracker identity.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Get the pool events are pushed into.
    pub fn pool(&self) -> &EventPool {
        &self.pool
    }

    /// Track an event and return its id.
    ///
    /// The event is in the pool when this returns. Subscribers are notified
    /// in call order.
    pub fn track(
        &self,
        event_type: impl Into<String>,
        properties: Map<String, Value>,
    ) -> TrackerResult<Uuid> {
        let event_type = event_type.into();
        if event_type.trim().is_empty() {
            return Err(TrackerError::EmptyEventType);
        }

        let context = self.current_context();
        let client = ClientInfo {
            id: self.config.client_id.clone(),
            track_id: self.config.track_id.clone(),
        };
        let event = Event::new(event_type, client, properties).with_context(context);

        self.pool.push(vec![event.to_entry()?]);
        debug!(id = %event.id, event_type = %event.event_type, "Tracked event");

        let _ = self.tracked.send(TrackedEvent {
            event_type: event.event_type,
            id: event.id,
            properties: event.properties,
            view: event.context.view,
            person_id: event.context.person_id.map(|person| person.id),
        });

        Ok(event.id)
    }

    /// Attach view information to future events. All `None` clears it.
    pub fn update_view(
        &self,
        path: Option<Vec<String>>,
        uri: Option<String>,
        previous_path: Option<Vec<String>>,
    ) {
        let view = if path.is_none() && uri.is_none() && previous_path.is_none() {
            None
        } else {
            Some(ViewContext {
                path,
                previous_path,
                uri,
            })
        };
        self.context.write().view = view;
    }

    /// Attach campaign information to future events. All `None` clears it.
    pub fn update_campaign(
        &self,
        name: Option<String>,
        source: Option<String>,
        medium: Option<String>,
        term: Option<String>,
        content: Option<String>,
    ) {
        let campaign = CampaignContext {
            name,
            source,
            medium,
            term,
            content,
        };
        self.context.write().campaign = (campaign != CampaignContext::default()).then_some(campaign);
    }

    /// Attach a person id to future events, or clear it with `None`.
    pub fn set_person_id(&self, person_id: Option<IdField>) {
        self.context.write().person_id = person_id;
    }

    /// Subscribe to every tracked event.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackedEvent> {
        self.tracked.subscribe()
    }

    /// Subscribe to tracked events of one type.
    pub fn subscribe_type(&self, event_type: impl Into<String>) -> TrackedReceiver {
        TrackedReceiver {
            inner: self.tracked.subscribe(),
            event_type: event_type.into(),
        }
    }

    fn current_context(&self) -> EventContext {
        let context = self.context.read();
        EventContext {
            session: Some(SessionContext {
                id: self.config.session_id.clone(),
            }),
            person_id: context.person_id.clone(),
            view: context.view.clone(),
            campaign: context.campaign.clone(),
        }
    }
}

impl std::fmt::Debug for EventsTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventsTracker")
            .field("track_id", &self.config.track_id)
            .field("client_id", &self.config.client_id)
            .finish_non_exhaustive()
    }
}

/// Receiver yielding only tracked events of one type.
#[derive(Debug)]
pub struct TrackedReceiver {
    inner: broadcast::Receiver<TrackedEvent>,
    event_type: String,
}

impl TrackedReceiver {
    /// Wait for the next event of this type.
    pub async fn recv(&mut self) -> Result<TrackedEvent, broadcast::error::RecvError> {
        loop {
            let event = self.inner.recv().await?;
            if event.event_type == self.event_type {
                return Ok(event);
            }
        }
    }

    /// Take the next buffered event of this type without waiting.
    pub fn try_recv(&mut self) -> Result<TrackedEvent, broadcast::error::TryRecvError> {
        loop {
            let event = self.inner.try_recv()?;
            if event.event_type == self.event_type {
                return Ok(event);
            }
        }
    }
}
