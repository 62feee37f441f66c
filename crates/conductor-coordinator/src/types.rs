use crate::config::SelectionStrategy;
use crate::monitor::AgentLoad;
use chrono::{DateTime, Utc};
use conductor_core::{AgentId, Capability, Task, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a submitter provides; the coordinator stamps identity and creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_type: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Arbitrary submission metadata carried on the queue entry.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TaskSpec {
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            priority: 0,
            payload: serde_json::Value::Null,
            metadata: HashMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A task plus its scheduling bookkeeping.
///
/// Lives either in the queue (unassigned) or in the in-progress map
/// (assigned); it is consumed into a [`TaskResult`] when resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub task: Task,
    pub required_capability: Capability,
    pub assigned_agent: Option<AgentId>,
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Optional execution context handed to the worker on every attempt.
    #[serde(default)]
    pub context: Option<serde_json::Value>,
    /// Submission order; breaks priority ties.
    pub sequence: u64,
    /// Bumped on every assignment so results from superseded dispatches can be recognised.
    pub generation: u64,
}

impl QueueEntry {
    pub fn new(
        task: Task,
        required_capability: Capability,
        metadata: HashMap<String, serde_json::Value>,
        context: Option<serde_json::Value>,
        sequence: u64,
    ) -> Self {
        Self {
            task,
            required_capability,
            assigned_agent: None,
            attempts: 0,
            last_attempt_at: None,
            metadata,
            context,
            sequence,
            generation: 0,
        }
    }

    pub fn id(&self) -> TaskId {
        self.task.id
    }

    /// Record a new attempt on `agent`.
    pub fn assign(&mut self, agent: AgentId, generation: u64) {
        self.assigned_agent = Some(agent);
        self.attempts += 1;
        self.last_attempt_at = Some(Utc::now());
        self.generation = generation;
    }

    /// Clear the assignment; the attempt count is kept.
    pub fn unassign(&mut self) {
        self.assigned_agent = None;
    }

    /// Milliseconds since the current attempt started.
    pub fn elapsed_ms(&self) -> u64 {
        self.last_attempt_at
            .map(|at| (Utc::now() - at).num_milliseconds().max(0) as u64)
            .unwrap_or(0)
    }
}

/// Terminal outcome of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
    /// `assigned_agent`, `attempts` and `task_type`.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TaskResult {
    pub fn succeeded(entry: &QueueEntry, data: serde_json::Value, duration_ms: u64) -> Self {
        Self {
            task_id: entry.id(),
            success: true,
            data: Some(data),
            error: None,
            duration_ms,
            completed_at: Utc::now(),
            metadata: result_metadata(entry),
        }
    }

    pub fn failed(entry: &QueueEntry, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            task_id: entry.id(),
            success: false,
            data: None,
            error: Some(error.into()),
            duration_ms,
            completed_at: Utc::now(),
            metadata: result_metadata(entry),
        }
    }

    pub fn attempts(&self) -> Option<u64> {
        self.metadata.get("attempts").and_then(serde_json::Value::as_u64)
    }
}

fn result_metadata(entry: &QueueEntry) -> HashMap<String, serde_json::Value> {
    let mut metadata = HashMap::new();
    metadata.insert(
        "assigned_agent".to_string(),
        serde_json::to_value(entry.assigned_agent).unwrap_or(serde_json::Value::Null),
    );
    metadata.insert("attempts".to_string(), serde_json::json!(entry.attempts));
    metadata.insert(
        "task_type".to_string(),
        serde_json::Value::String(entry.task.task_type.clone()),
    );
    metadata
}

/// Where a task currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    InProgress,
    Completed,
    NotFound,
}

/// Snapshot of queue and agent load counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub strategy: SelectionStrategy,
    pub agent_loads: HashMap<AgentId, AgentLoad>,
}
