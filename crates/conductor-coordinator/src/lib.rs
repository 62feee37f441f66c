//! Task coordination: queueing, agent selection, dispatch and retries.
//!
//! Tasks submitted to the [`Coordinator`] are resolved to a required
//! capability, queued by priority, and dispatched to running agents found
//! through an [`AgentDirectory`](conductor_agent::AgentDirectory). Failed
//! attempts are retried up to a limit; progress is published as `task.*`
//! events on the shared [`EventChannel`](conductor_events::EventChannel).
//!
//! # Main types
//!
//! - [`Coordinator`]: Owns the queue and runs scheduling passes.
//! - [`CoordinatorConfig`]: Queue size, retry limit, strategy and capability map.
//! - [`SelectionStrategy`]: How an agent is chosen for a task.
//! - [`TaskQueue`]: Queued, in-progress and completed bookkeeping.
//! - [`LoadTracker`]: Per-agent in-flight counters.

/// Coordinator settings and task-type resolution.
pub mod config;
/// The coordinator and its scheduling pass.
pub mod engine;
/// Per-agent load counters.
pub mod monitor;
/// Agent selection strategies.
pub mod strategy;
/// Queue, in-progress set and result history.
pub mod task_queue;
/// Task specs, queue entries, results and stats.
pub mod types;

pub use config::{CapabilityResolver, CoordinatorConfig, SelectionStrategy};
pub use engine::{Coordinator, COORDINATOR_SOURCE};
pub use monitor::{AgentLoad, LoadTracker};
pub use strategy::select_agent;
pub use task_queue::TaskQueue;
pub use types::{QueueEntry, QueueStats, TaskResult, TaskSpec, TaskState};
