use crate::config::{CapabilityResolver, CoordinatorConfig, SelectionStrategy};
use crate::monitor::LoadTracker;
use crate::strategy::select_agent;
use crate::task_queue::TaskQueue;
use crate::types::{QueueEntry, QueueStats, TaskResult, TaskSpec, TaskState};
use conductor_agent::{Agent, AgentDirectory};
use conductor_core::{AgentId, AgentStatus, ConductorError, ConductorResult, Task, TaskId};
use conductor_events::{AgentEvent, EventChannel, EventType, SubscriptionId};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Event source used for everything the coordinator publishes.
pub const COORDINATOR_SOURCE: &str = "coordinator";

/// The scheduling core.
///
/// Owns the task queue, in-progress set, result history and per-agent load
/// counters. Scheduling passes run on submission, when an agent starts or
/// shuts down, and on a periodic tick (see [`Coordinator::start`]).
///
/// All state lives behind one mutex that is never held across an `.await`
/// or while publishing events, so passes can be triggered from any thread
/// and from inside event callbacks.
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
    subscriptions: Vec<SubscriptionId>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

struct CoordinatorInner {
    config: CoordinatorConfig,
    resolver: CapabilityResolver,
    directory: Arc<dyn AgentDirectory>,
    events: Arc<EventChannel>,
    runtime: Handle,
    state: Mutex<SchedulerState>,
    results: Notify,
}

struct SchedulerState {
    queue: TaskQueue,
    loads: LoadTracker,
    strategy: SelectionStrategy,
    cursor: Option<AgentId>,
    next_sequence: u64,
    next_generation: u64,
    /// Events in the order the state changed; drained by [`CoordinatorInner::flush`].
    outbox: VecDeque<Notice>,
    /// Set while some thread is draining the outbox.
    flushing: bool,
}

/// An assignment made under the lock, executed after it is released.
struct Dispatch {
    agent: Arc<Agent>,
    task: Task,
    context: Option<serde_json::Value>,
    generation: u64,
}

type Notice = (EventType, serde_json::Value);

impl Coordinator {
    /// Create a coordinator and subscribe it to agent start/shutdown events.
    ///
    /// Must be called from within a Tokio runtime; executions are spawned on it.
    pub fn new(
        config: CoordinatorConfig,
        directory: Arc<dyn AgentDirectory>,
        events: Arc<EventChannel>,
    ) -> ConductorResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| {
            ConductorError::Config("Coordinator must be created inside a Tokio runtime".into())
        })?;

        let inner = Arc::new(CoordinatorInner {
            resolver: CapabilityResolver::from_config(&config),
            state: Mutex::new(SchedulerState {
                queue: TaskQueue::new(config.max_completed_results),
                loads: LoadTracker::new(),
                strategy: config.default_selection_strategy,
                cursor: None,
                next_sequence: 0,
                next_generation: 0,
                outbox: VecDeque::new(),
                flushing: false,
            }),
            config,
            directory,
            events: events.clone(),
            runtime,
            results: Notify::new(),
        });

        let on_started = Arc::downgrade(&inner);
        let started = events.subscribe(EventType::AgentStarted, move |event| {
            if let Some(inner) = on_started.upgrade() {
                debug!(source = %event.source, "Agent started, scheduling");
                inner.run_pass();
            }
            Ok(())
        });

        let on_shutdown = Arc::downgrade(&inner);
        let shutdown = events.subscribe(EventType::AgentShutdown, move |event| {
            handle_shutdown_event(&on_shutdown, event)
        });

        info!(
            strategy = %inner.config.default_selection_strategy,
            max_queue_size = inner.config.max_queue_size,
            max_retries = inner.config.max_retries,
            "Coordinator created"
        );

        Ok(Self {
            inner,
            subscriptions: vec![started, shutdown],
            ticker: Mutex::new(None),
        })
    }

    /// Start the periodic scheduling tick. Calling it twice restarts the loop.
    pub fn start(&self) {
        let weak = Arc::downgrade(&self.inner);
        let period = Duration::from_millis(self.inner.config.task_poll_interval_ms);
        let handle = self.inner.runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match weak.upgrade() {
                    Some(inner) => inner.run_pass(),
                    None => break,
                }
            }
        });
        if let Some(previous) = self.ticker.lock().replace(handle) {
            previous.abort();
        }
        info!(interval_ms = period.as_millis() as u64, "Coordinator tick started");
    }

    /// Stop the periodic tick. In-flight executions are unaffected.
    pub fn stop(&self) {
        if let Some(handle) = self.ticker.lock().take() {
            handle.abort();
            info!("Coordinator tick stopped");
        }
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.lock().is_some()
    }

    /// Submit a task. This is the sole external entry point for new work.
    ///
    /// Fails synchronously with [`ConductorError::QueueFull`] when the queue
    /// is at capacity, or [`ConductorError::UnknownTaskType`] when the type
    /// cannot be mapped to a capability.
    pub fn submit_task(
        &self,
        spec: TaskSpec,
        context: Option<serde_json::Value>,
    ) -> ConductorResult<TaskId> {
        let inner = &self.inner;

        let task_id = {
            let mut state = inner.state.lock();
            if state.queue.queued_count() >= inner.config.max_queue_size {
                warn!(
                    task_type = %spec.task_type,
                    max = inner.config.max_queue_size,
                    "Rejecting task: queue full"
                );
                return Err(ConductorError::QueueFull {
                    max: inner.config.max_queue_size,
                });
            }
            let capability = inner.resolver.resolve(&spec.task_type)?;
            state.next_sequence += 1;
            let task = Task::new(spec.task_type, spec.priority, spec.payload);
            let entry = QueueEntry::new(
                task,
                capability,
                spec.metadata,
                context,
                state.next_sequence,
            );
            let task_id = entry.id();
            state.outbox.push_back((
                EventType::TaskReceived,
                json!({
                    "task_id": task_id,
                    "task_type": entry.task.task_type,
                    "priority": entry.task.priority,
                    "capability": entry.required_capability,
                }),
            ));
            state.queue.enqueue(entry);
            task_id
        };

        info!(task_id = %task_id, "Task received");
        inner.flush();
        inner.run_pass();
        Ok(task_id)
    }

    /// Run one scheduling pass immediately.
    pub fn run_scheduling_pass(&self) {
        self.inner.run_pass();
    }

    pub fn get_task_status(&self, id: TaskId) -> TaskState {
        self.inner.state.lock().queue.state(id)
    }

    pub fn get_task_result(&self, id: TaskId) -> Option<TaskResult> {
        self.inner.state.lock().queue.result(id).cloned()
    }

    /// Snapshot of a queued or in-progress entry.
    pub fn get_queue_entry(&self, id: TaskId) -> Option<QueueEntry> {
        self.inner.state.lock().queue.entry(id).cloned()
    }

    pub fn get_queue_stats(&self) -> QueueStats {
        let state = self.inner.state.lock();
        QueueStats {
            queued: state.queue.queued_count(),
            in_progress: state.queue.in_progress_count(),
            completed: state.queue.completed_count(),
            succeeded: state.queue.succeeded_count(),
            failed: state.queue.failed_count(),
            strategy: state.strategy,
            agent_loads: state.loads.snapshot(),
        }
    }

    /// Drop the completed-result history. Returns the number of results removed.
    pub fn clear_completed_tasks(&self) -> usize {
        let cleared = self.inner.state.lock().queue.clear_completed();
        info!(cleared, "Cleared completed tasks");
        cleared
    }

    pub fn agent_load(&self, agent: AgentId) -> usize {
        self.inner.state.lock().loads.load(agent)
    }

    pub fn strategy(&self) -> SelectionStrategy {
        self.inner.state.lock().strategy
    }

    /// Switch the selection strategy for subsequent passes.
    pub fn set_strategy(&self, strategy: SelectionStrategy) {
        let mut state = self.inner.state.lock();
        if state.strategy != strategy {
            info!(from = %state.strategy, to = %strategy, "Selection strategy changed");
            state.strategy = strategy;
            state.cursor = None;
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Wait until `id` has a terminal result, or `timeout` elapses.
    pub async fn wait_for_result(&self, id: TaskId, timeout: Duration) -> Option<TaskResult> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.inner.results.notified();
            if let Some(result) = self.get_task_result(id) {
                return Some(result);
            }
            if self.get_task_status(id) == TaskState::NotFound {
                return None;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.get_task_result(id);
            }
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        for id in &self.subscriptions {
            self.inner.events.unsubscribe(*id);
        }
        if let Some(handle) = self.ticker.get_mut().take() {
            handle.abort();
        }
    }
}

fn handle_shutdown_event(
    inner: &Weak<CoordinatorInner>,
    event: &AgentEvent,
) -> ConductorResult<()> {
    let Some(inner) = inner.upgrade() else {
        return Ok(());
    };
    let agent_id = event
        .payload
        .get("agent_id")
        .cloned()
        .map(serde_json::from_value::<AgentId>)
        .transpose()?
        .ok_or_else(|| {
            ConductorError::Execution(format!(
                "agent.shutdown event from '{}' carries no agent_id",
                event.source
            ))
        })?;
    inner.reclaim_agent(agent_id);
    inner.run_pass();
    Ok(())
}

impl CoordinatorInner {
    /// Match queued entries to agents, highest priority first.
    fn run_pass(self: &Arc<Self>) {
        let mut dispatches = Vec::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            for task_id in state.queue.prioritized() {
                let Some(entry) = state.queue.queued_entry(task_id) else {
                    continue;
                };
                let capability = entry.required_capability.clone();
                let Some(agent) = select_agent(
                    state.strategy,
                    self.directory.as_ref(),
                    &capability,
                    &state.loads,
                    state.cursor,
                ) else {
                    debug!(task_id = %task_id, capability = %capability, "No agent available");
                    continue;
                };

                if let Err(e) = self.verify_dispatchable(agent.id()) {
                    warn!(task_id = %task_id, error = %e, "Selected agent cannot take work");
                    continue;
                }

                let Some(mut entry) = state.queue.take_queued(task_id) else {
                    continue;
                };
                state.next_generation += 1;
                entry.assign(agent.id(), state.next_generation);
                state.loads.assign(agent.id());
                if state.strategy == SelectionStrategy::RoundRobin {
                    state.cursor = Some(agent.id());
                }

                info!(
                    task_id = %task_id,
                    agent_id = %agent.id(),
                    attempt = entry.attempts,
                    "Task assigned"
                );
                state.outbox.push_back((
                    EventType::TaskStarted,
                    json!({
                        "task_id": task_id,
                        "agent_id": agent.id(),
                        "agent_name": agent.name(),
                        "attempt": entry.attempts,
                    }),
                ));
                dispatches.push(Dispatch {
                    agent,
                    task: entry.task.clone(),
                    context: entry.context.clone(),
                    generation: entry.generation,
                });
                state.queue.mark_in_progress(entry);
            }
            if !dispatches.is_empty() {
                debug!(
                    assigned = dispatches.len(),
                    in_flight = state.loads.total_in_flight(),
                    still_queued = state.queue.queued_count(),
                    "Scheduling pass finished"
                );
            }
        }

        self.flush();
        for dispatch in dispatches {
            self.spawn_execution(dispatch);
        }
    }

    /// The live handle must still exist and be running.
    fn verify_dispatchable(&self, agent_id: AgentId) -> ConductorResult<()> {
        let agent = self
            .directory
            .get_agent_instance_by_id(agent_id)
            .ok_or(ConductorError::AgentNotFound(agent_id))?;
        match agent.status() {
            AgentStatus::Running => Ok(()),
            status => Err(ConductorError::AgentNotRunning { agent_id, status }),
        }
    }

    fn spawn_execution(self: &Arc<Self>, dispatch: Dispatch) {
        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            let Dispatch {
                agent,
                task,
                context,
                generation,
            } = dispatch;
            let task_id = task.id;
            // A panicking worker counts as a failed attempt.
            let run = tokio::spawn(async move {
                agent.execute_task(&task, context.as_ref()).await
            });
            let outcome = match run.await {
                Ok(outcome) => outcome,
                Err(e) => Err(ConductorError::Execution(format!("worker aborted: {e}"))),
            };
            inner.finish(task_id, generation, outcome);
        });
    }

    /// Apply an execution outcome: store a result, or requeue for retry.
    fn finish(
        &self,
        task_id: TaskId,
        generation: u64,
        outcome: ConductorResult<serde_json::Value>,
    ) {
        {
            let mut state = self.state.lock();
            let Some(mut entry) = state.queue.take_in_progress(task_id, generation) else {
                debug!(
                    task_id = %task_id,
                    generation,
                    "Discarding result from a superseded dispatch"
                );
                return;
            };
            let agent_id = entry.assigned_agent;
            let duration_ms = entry.elapsed_ms();
            if let Some(agent) = agent_id {
                state.loads.release(agent, outcome.is_ok());
            }

            let notice = match outcome {
                Ok(data) => {
                    info!(
                        task_id = %task_id,
                        duration_ms,
                        attempts = entry.attempts,
                        "Task completed"
                    );
                    state
                        .queue
                        .record_result(TaskResult::succeeded(&entry, data, duration_ms));
                    (
                        EventType::TaskCompleted,
                        json!({
                            "task_id": task_id,
                            "agent_id": agent_id,
                            "duration_ms": duration_ms,
                            "attempts": entry.attempts,
                        }),
                    )
                }
                Err(e) if entry.attempts < self.config.max_retries => {
                    warn!(
                        task_id = %task_id,
                        attempt = entry.attempts,
                        max_retries = self.config.max_retries,
                        error = %e,
                        "Task attempt failed, will retry"
                    );
                    let attempts = entry.attempts;
                    entry.unassign();
                    state.queue.enqueue(entry);
                    (
                        EventType::TaskRetry,
                        json!({
                            "task_id": task_id,
                            "agent_id": agent_id,
                            "attempt": attempts,
                            "max_retries": self.config.max_retries,
                            "error": e.to_string(),
                        }),
                    )
                }
                Err(e) => {
                    error!(
                        task_id = %task_id,
                        attempts = entry.attempts,
                        error = %e,
                        "Task failed"
                    );
                    state
                        .queue
                        .record_result(TaskResult::failed(&entry, e.to_string(), duration_ms));
                    (
                        EventType::TaskFailed,
                        json!({
                            "task_id": task_id,
                            "agent_id": agent_id,
                            "attempts": entry.attempts,
                            "error": e.to_string(),
                        }),
                    )
                }
            };
            state.outbox.push_back(notice);
        }

        self.flush();
        self.results.notify_waiters();
    }

    /// Return an agent's in-progress work to the queue without counting an attempt.
    fn reclaim_agent(&self, agent_id: AgentId) {
        let reclaimed = {
            let mut state = self.state.lock();
            let reclaimed = state.queue.take_in_progress_for(agent_id);
            state.loads.remove(agent_id);
            if state.cursor == Some(agent_id) {
                state.cursor = None;
            }
            let count = reclaimed.len();
            for mut entry in reclaimed {
                entry.unassign();
                state.outbox.push_back((
                    EventType::TaskReassigned,
                    json!({
                        "task_id": entry.id(),
                        "agent_id": agent_id,
                        "attempts": entry.attempts,
                    }),
                ));
                state.queue.enqueue(entry);
            }
            count
        };

        if reclaimed > 0 {
            info!(
                agent_id = %agent_id,
                tasks = reclaimed,
                "Agent shutting down, returning its tasks to the queue"
            );
        }
        self.flush();
    }

    /// Publish queued notices in the order the state changed.
    ///
    /// Only one caller drains at a time; a caller that finds a drain in
    /// progress (another thread, or a subscriber re-entering from a callback)
    /// leaves its notices for that drainer. No lock is held while publishing.
    fn flush(&self) {
        {
            let mut state = self.state.lock();
            if state.flushing {
                return;
            }
            state.flushing = true;
        }
        loop {
            let batch: Vec<Notice> = {
                let mut state = self.state.lock();
                if state.outbox.is_empty() {
                    state.flushing = false;
                    return;
                }
                state.outbox.drain(..).collect()
            };
            for (event_type, payload) in batch {
                self.events.publish(event_type, COORDINATOR_SOURCE, payload, None);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conductor_agent::{AgentDescriptor, AgentRegistry, Worker};
    use std::collections::HashMap;

    struct EchoWorker;

    #[async_trait]
    impl Worker for EchoWorker {
        async fn execute_task(
            &self,
            task: &Task,
            _context: Option<&serde_json::Value>,
        ) -> ConductorResult<serde_json::Value> {
            Ok(task.payload.clone())
        }
    }

    struct PanicWorker;

    #[async_trait]
    impl Worker for PanicWorker {
        async fn execute_task(
            &self,
            _task: &Task,
            _context: Option<&serde_json::Value>,
        ) -> ConductorResult<serde_json::Value> {
            panic!("worker exploded");
        }
    }

    type Fixture = (Coordinator, Arc<AgentRegistry>, Arc<EventChannel>);

    fn setup(config: CoordinatorConfig) -> Fixture {
        let events = Arc::new(EventChannel::default());
        let registry = Arc::new(AgentRegistry::new());
        let coordinator = Coordinator::new(config, registry.clone(), events.clone()).unwrap();
        (coordinator, registry, events)
    }

    async fn add_agent(
        registry: &AgentRegistry,
        events: &Arc<EventChannel>,
        caps: &[&str],
        worker: Arc<dyn Worker>,
    ) -> Arc<Agent> {
        let descriptor = AgentDescriptor::new("worker", "test", caps.iter().copied(), 0);
        let agent = Arc::new(Agent::new(descriptor, worker, events.clone()));
        registry.register(agent.clone());
        agent.start().await.unwrap();
        agent
    }

    #[test]
    fn test_new_requires_runtime() {
        let events = Arc::new(EventChannel::default());
        let registry = Arc::new(AgentRegistry::new());
        let result = Coordinator::new(CoordinatorConfig::default(), registry, events);
        assert!(matches!(result, Err(ConductorError::Config(_))));
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let events = Arc::new(EventChannel::default());
        let registry = Arc::new(AgentRegistry::new());
        let config = CoordinatorConfig {
            task_poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(Coordinator::new(config, registry, events).is_err());
    }

    #[tokio::test]
    async fn test_submit_without_agents_stays_queued() {
        let (coordinator, _registry, events) = setup(CoordinatorConfig::default());
        let id = coordinator
            .submit_task(TaskSpec::new("gis_repair").with_priority(3), None)
            .unwrap();

        assert_eq!(coordinator.get_task_status(id), TaskState::Queued);
        let entry = coordinator.get_queue_entry(id).unwrap();
        assert_eq!(entry.attempts, 0);
        assert_eq!(entry.required_capability.as_str(), "gis_repair");

        let received = events.recent_events(10, Some(&EventType::TaskReceived), None);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].source, COORDINATOR_SOURCE);
        assert_eq!(received[0].payload["priority"], 3);
    }

    #[tokio::test]
    async fn test_capability_map_applied_on_submit() {
        let mut capability_map = HashMap::new();
        capability_map.insert("parcel_fix".to_string(), "gis_repair".to_string());
        let (coordinator, _registry, _events) = setup(CoordinatorConfig {
            capability_map,
            require_explicit_capability: true,
            ..Default::default()
        });

        let id = coordinator.submit_task(TaskSpec::new("parcel_fix"), None).unwrap();
        assert_eq!(
            coordinator.get_queue_entry(id).unwrap().required_capability.as_str(),
            "gis_repair"
        );
        assert!(matches!(
            coordinator.submit_task(TaskSpec::new("valuation"), None),
            Err(ConductorError::UnknownTaskType(_))
        ));
        assert_eq!(coordinator.get_queue_stats().queued, 1);
    }

    #[tokio::test]
    async fn test_task_runs_when_agent_starts() {
        let (coordinator, registry, events) = setup(CoordinatorConfig::default());
        let id = coordinator
            .submit_task(
                TaskSpec::new("echo").with_payload(serde_json::json!({"n": 1})),
                None,
            )
            .unwrap();
        assert_eq!(coordinator.get_task_status(id), TaskState::Queued);

        add_agent(&registry, &events, &["echo"], Arc::new(EchoWorker)).await;
        let result = coordinator
            .wait_for_result(id, Duration::from_secs(5))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.data, Some(serde_json::json!({"n": 1})));
        assert_eq!(result.attempts(), Some(1));
        assert_eq!(coordinator.get_task_status(id), TaskState::Completed);
    }

    #[tokio::test]
    async fn test_panicking_worker_fails_task() {
        let (coordinator, registry, events) = setup(CoordinatorConfig {
            max_retries: 1,
            ..Default::default()
        });
        add_agent(&registry, &events, &["boom"], Arc::new(PanicWorker)).await;

        let id = coordinator.submit_task(TaskSpec::new("boom"), None).unwrap();
        let result = coordinator
            .wait_for_result(id, Duration::from_secs(5))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("worker aborted"));
        assert_eq!(coordinator.get_queue_stats().in_progress, 0);
    }

    #[tokio::test]
    async fn test_wait_for_unknown_task() {
        let (coordinator, _registry, _events) = setup(CoordinatorConfig::default());
        let waited = coordinator
            .wait_for_result(TaskId::new(), Duration::from_millis(50))
            .await;
        assert!(waited.is_none());
    }

    #[tokio::test]
    async fn test_set_strategy() {
        let (coordinator, _registry, _events) = setup(CoordinatorConfig::default());
        assert_eq!(coordinator.strategy(), SelectionStrategy::CapabilityMatch);
        coordinator.set_strategy(SelectionStrategy::LoadBalanced);
        assert_eq!(coordinator.strategy(), SelectionStrategy::LoadBalanced);
        assert_eq!(
            coordinator.get_queue_stats().strategy,
            SelectionStrategy::LoadBalanced
        );
    }

    #[tokio::test]
    async fn test_start_and_stop_tick() {
        let (coordinator, _registry, _events) = setup(CoordinatorConfig::default());
        assert!(!coordinator.is_ticking());
        coordinator.start();
        assert!(coordinator.is_ticking());
        coordinator.stop();
        assert!(!coordinator.is_ticking());
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let (coordinator, _registry, events) = setup(CoordinatorConfig::default());
        assert_eq!(events.subscriber_count(), 2);
        drop(coordinator);
        assert_eq!(events.subscriber_count(), 0);
    }
}
