//! Application-level event tracking.
//!
//! This crate provides:
//! - Event: the wire shape of one tracked event, plus its context types
//! - EventsTracker: builds events from type, properties and current context and pushes them into the pool
//! - EventsClient: wires a disk cache, HTTP shipper, pool and tracker together from `Config`

mod client;
mod error;
mod event;
mod tracker;

pub use client::EventsClient;
pub use error::{TrackerError, TrackerResult};
pub use event::{
    sanitize_properties, CampaignContext, ClientInfo, Event, EventContext, IdField,
    SessionContext, ViewContext, EVENT_VERSION,
};
pub use tracker::{EventsTracker, TrackedEvent, TrackedReceiver, TrackerConfig};
