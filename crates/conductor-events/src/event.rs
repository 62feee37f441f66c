use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Kind of event flowing through the [`EventChannel`](crate::EventChannel).
///
/// Serializes to the dotted topic name (`"task.started"`), so events can be
/// stored or forwarded as plain JSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    AgentStarted,
    AgentPaused,
    AgentResumed,
    /// Emitted when an agent enters `ShuttingDown`.
    AgentShutdown,
    AgentStopped,
    AgentError,
    TaskReceived,
    TaskStarted,
    TaskCompleted,
    /// A failed attempt that will be retried on a later pass.
    TaskRetry,
    /// Terminal failure: retries exhausted.
    TaskFailed,
    /// An in-progress task returned to the queue because its agent shut down.
    TaskReassigned,
    Custom(String),
}

impl EventType {
    /// The dotted topic name of this event type.
    pub fn as_str(&self) -> &str {
        match self {
            EventType::AgentStarted => "agent.started",
            EventType::AgentPaused => "agent.paused",
            EventType::AgentResumed => "agent.resumed",
            EventType::AgentShutdown => "agent.shutdown",
            EventType::AgentStopped => "agent.stopped",
            EventType::AgentError => "agent.error",
            EventType::TaskReceived => "task.received",
            EventType::TaskStarted => "task.started",
            EventType::TaskCompleted => "task.completed",
            EventType::TaskRetry => "task.retry",
            EventType::TaskFailed => "task.failed",
            EventType::TaskReassigned => "task.reassigned",
            EventType::Custom(name) => name,
        }
    }

    /// Parses a dotted topic name; unknown names become [`EventType::Custom`].
    pub fn parse(name: &str) -> Self {
        match name {
            "agent.started" => EventType::AgentStarted,
            "agent.paused" => EventType::AgentPaused,
            "agent.resumed" => EventType::AgentResumed,
            "agent.shutdown" => EventType::AgentShutdown,
            "agent.stopped" => EventType::AgentStopped,
            "agent.error" => EventType::AgentError,
            "task.received" => EventType::TaskReceived,
            "task.started" => EventType::TaskStarted,
            "task.completed" => EventType::TaskCompleted,
            "task.retry" => EventType::TaskRetry,
            "task.failed" => EventType::TaskFailed,
            "task.reassigned" => EventType::TaskReassigned,
            other => EventType::Custom(other.to_string()),
        }
    }

    /// Folds a `Custom` holding a well-known name into its named variant.
    ///
    /// The channel normalizes both subscriptions and published events, so
    /// `Custom("task.started")` and `TaskStarted` address the same topic.
    pub fn normalized(self) -> Self {
        match self {
            EventType::Custom(name) => EventType::parse(&name),
            known => known,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(EventType::parse(&name))
    }
}

/// What a subscriber listens to: one event type, or every event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Wildcard: receives every published event, after topic subscribers.
    All,
    Type(EventType),
}

impl From<EventType> for Topic {
    fn from(event_type: EventType) -> Self {
        Topic::Type(event_type.normalized())
    }
}

/// The unit flowing through the event channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub id: Uuid,
    pub event_type: EventType,
    /// Publisher identity, e.g. an agent id or `"coordinator"`.
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl AgentEvent {
    pub fn new(
        event_type: EventType,
        source: impl Into<String>,
        payload: serde_json::Value,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.normalized(),
            source: source.into(),
            timestamp: Utc::now(),
            payload,
            metadata,
        }
    }

    /// Reads a string field from the payload.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(serde_json::Value::as_str)
    }
}
