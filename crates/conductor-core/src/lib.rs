//! Core types and error definitions for the Conductor task coordination engine.
//!
//! This crate provides the foundational types shared across all Conductor crates,
//! including error handling, identifiers, capabilities, and agent lifecycle status.
//!
//! # Main types
//!
//! - [`ConductorError`]: Unified error enum for all Conductor subsystems.
//! - [`ConductorResult`]: Convenience alias for `Result<T, ConductorError>`.
//! - [`AgentId`] / [`TaskId`]: Strongly typed identifiers.
//! - [`Capability`]: A skill tag an agent advertises and a task requires.
//! - [`Task`]: A submitted unit of work.
//! - [`AgentStatus`]: Lifecycle status of an agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// --- Error types ---

/// Top-level error type for the Conductor engine.
///
/// Each variant corresponds to one failure class a caller may need to tell
/// apart: submit-time rejections, agent lifecycle problems, and execution
/// failures raised by workers.
#[derive(Debug, thiserror::Error)]
pub enum ConductorError {
    /// The task queue already holds its configured maximum of entries.
    #[error("Task queue is full (max {max} entries)")]
    QueueFull {
        /// The configured queue capacity.
        max: usize,
    },

    /// A submitted task type could not be mapped to a required capability.
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    /// No agent instance is known under the given id.
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    /// The agent exists but is not in the `Running` state.
    #[error("Agent {agent_id} is not running (status: {status})")]
    AgentNotRunning {
        /// The agent that was selected.
        agent_id: AgentId,
        /// The status observed at dispatch time.
        status: AgentStatus,
    },

    /// A lifecycle operation was requested from a state that does not allow it.
    #[error("Cannot {action} agent in status {from}")]
    InvalidTransition {
        /// Status the agent was in.
        from: AgentStatus,
        /// The lifecycle operation that was attempted.
        action: &'static str,
    },

    /// The worker's `initialize` hook failed during `start`.
    #[error("Agent initialization failed: {0}")]
    AgentInitialization(String),

    /// The worker's shutdown hook failed and shutdown was not forced.
    #[error("Agent shutdown failed: {0}")]
    AgentShutdown(String),

    /// A worker failed while executing a task.
    #[error("Execution error: {0}")]
    Execution(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`ConductorError`].
pub type ConductorResult<T> = Result<T, ConductorError>;

// --- Identifiers ---

/// Unique identity of an agent instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub Uuid);

impl AgentId {
    /// Generates a fresh random agent id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identity of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generates a fresh random task id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// --- Capabilities ---

/// A skill tag an agent advertises and a task requires.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    /// Creates a capability from its tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The raw tag.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Capability {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for Capability {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

// --- Task types ---

/// A submitted unit of work. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier stamped at submission.
    pub id: TaskId,
    /// Task type; resolved to a required [`Capability`] by the coordinator.
    pub task_type: String,
    /// Higher values are scheduled first.
    pub priority: i32,
    /// Opaque input handed to the worker.
    pub payload: serde_json::Value,
    /// UTC timestamp of submission.
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Creates a task with a fresh id and the current timestamp.
    pub fn new(task_type: impl Into<String>, priority: i32, payload: serde_json::Value) -> Self {
        Self {
            id: TaskId::new(),
            task_type: task_type.into(),
            priority,
            payload,
            created_at: Utc::now(),
        }
    }
}

// --- Agent status ---

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Constructed (or restarting) and not yet initialized.
    Initializing,
    /// Accepting work.
    Running,
    /// Temporarily not accepting work.
    Paused,
    /// Shutdown hook in progress, or a non-forced shutdown failed.
    ShuttingDown,
    /// Fully stopped.
    Stopped,
    /// Initialization failed.
    Error,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Initializing => write!(f, "initializing"),
            AgentStatus::Running => write!(f, "running"),
            AgentStatus::Paused => write!(f, "paused"),
            AgentStatus::ShuttingDown => write!(f, "shutting_down"),
            AgentStatus::Stopped => write!(f, "stopped"),
            AgentStatus::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_full_message() {
        let err = ConductorError::QueueFull { max: 10 };
        assert_eq!(err.to_string(), "Task queue is full (max 10 entries)");
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = ConductorError::InvalidTransition {
            from: AgentStatus::Stopped,
            action: "pause",
        };
        assert_eq!(err.to_string(), "Cannot pause agent in status stopped");
    }

    #[test]
    fn test_agent_status_serialization() {
        let json = serde_json::to_string(&AgentStatus::ShuttingDown).unwrap();
        assert_eq!(json, "\"shutting_down\"");
        let parsed: AgentStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, AgentStatus::ShuttingDown);
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(AgentId::new(), AgentId::new());
        assert_ne!(TaskId::new(), TaskId::new());
    }

    #[test]
    fn test_capability_is_transparent() {
        let cap = Capability::from("gis_repair");
        assert_eq!(serde_json::to_string(&cap).unwrap(), "\"gis_repair\"");
        assert_eq!(cap.to_string(), "gis_repair");
    }

    #[test]
    fn test_task_creation() {
        let task = Task::new("valuation", 5, serde_json::json!({"parcel": 42}));
        assert_eq!(task.task_type, "valuation");
        assert_eq!(task.priority, 5);
        assert_eq!(task.payload["parcel"], 42);
    }

    #[test]
    fn test_json_error_conversion() {
        let bad: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: ConductorError = bad.unwrap_err().into();
        assert!(matches!(err, ConductorError::Json(_)));
    }
}
