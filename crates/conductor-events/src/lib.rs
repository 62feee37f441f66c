//! Publish/subscribe event channel for agent lifecycle and task progress.
//!
//! Agents, the agent directory, and the coordinator publish onto a shared
//! [`EventChannel`]; external listeners subscribe by topic or to every event.
//!
//! # Main types
//!
//! - [`EventChannel`]: Synchronous fan-out with a bounded in-memory history.
//! - [`AgentEvent`]: The unit flowing through the channel.
//! - [`EventType`]: Well-known topics plus custom ones.
//! - [`Topic`]: A single event type or the wildcard.
//! - [`SubscriptionId`]: Handle that detaches exactly one subscription.

/// Channel implementation (subscribers and history).
pub mod channel;
/// Event and topic types.
pub mod event;

pub use channel::{
    EventCallback, EventChannel, EventFilter, SubscriptionId, DEFAULT_HISTORY_CAPACITY,
};
pub use event::{AgentEvent, EventType, Topic};
