use crate::worker::Worker;
use chrono::{DateTime, Utc};
use conductor_core::{AgentId, AgentStatus, Capability, ConductorError, ConductorResult, Task};
use conductor_events::{EventChannel, EventType};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Static identity and scheduling attributes of an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: AgentId,
    pub name: String,
    pub agent_type: String,
    pub capabilities: BTreeSet<Capability>,
    /// Used by the priority selection strategy; higher wins.
    pub priority: i32,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentDescriptor {
    pub fn new<C>(
        name: impl Into<String>,
        agent_type: impl Into<String>,
        capabilities: impl IntoIterator<Item = C>,
        priority: i32,
    ) -> Self
    where
        C: Into<Capability>,
    {
        Self {
            id: AgentId::new(),
            name: name.into(),
            agent_type: agent_type.into(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            priority,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn has_capability(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }
}

#[derive(Debug, Clone, Copy)]
struct Lifecycle {
    status: AgentStatus,
    started_at: Option<DateTime<Utc>>,
}

/// A stateful worker with a capability set, priority and lifecycle.
///
/// Every lifecycle transition is published on the shared [`EventChannel`]
/// with the agent id as source. Lifecycle operations are serialized per agent.
pub struct Agent {
    descriptor: AgentDescriptor,
    worker: Arc<dyn Worker>,
    events: Arc<EventChannel>,
    lifecycle: RwLock<Lifecycle>,
    transition: tokio::sync::Mutex<()>,
}

impl Agent {
    /// Create an agent in the `Initializing` state.
    pub fn new(
        descriptor: AgentDescriptor,
        worker: Arc<dyn Worker>,
        events: Arc<EventChannel>,
    ) -> Self {
        Self {
            descriptor,
            worker,
            events,
            lifecycle: RwLock::new(Lifecycle {
                status: AgentStatus::Initializing,
                started_at: None,
            }),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> AgentId {
        self.descriptor.id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    pub fn priority(&self) -> i32 {
        self.descriptor.priority
    }

    pub fn has_capability(&self, capability: &Capability) -> bool {
        self.descriptor.has_capability(capability)
    }

    pub fn status(&self) -> AgentStatus {
        self.lifecycle.read().status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.lifecycle.read().started_at
    }

    /// Initialize the worker and begin accepting work.
    ///
    /// Allowed from `Initializing`, `Stopped` and `Error` (manual restart).
    pub async fn start(&self) -> ConductorResult<()> {
        let _guard = self.transition.lock().await;
        let current = self.status();
        if !matches!(
            current,
            AgentStatus::Initializing | AgentStatus::Stopped | AgentStatus::Error
        ) {
            return Err(ConductorError::InvalidTransition {
                from: current,
                action: "start",
            });
        }
        self.set_status(AgentStatus::Initializing);

        match self.worker.initialize().await {
            Ok(()) => {
                {
                    let mut lifecycle = self.lifecycle.write();
                    lifecycle.status = AgentStatus::Running;
                    lifecycle.started_at = Some(Utc::now());
                }
                info!(agent_id = %self.id(), name = %self.name(), "Agent started");
                self.emit(EventType::AgentStarted, None);
                Ok(())
            }
            Err(e) => {
                self.set_status(AgentStatus::Error);
                warn!(
                    agent_id = %self.id(),
                    name = %self.name(),
                    error = %e,
                    "Agent initialization failed"
                );
                self.emit(EventType::AgentError, Some(e.to_string()));
                Err(ConductorError::AgentInitialization(e.to_string()))
            }
        }
    }

    /// Stop accepting work. Only allowed from `Running`.
    pub async fn pause(&self) -> ConductorResult<()> {
        self.simple_transition(
            AgentStatus::Running,
            AgentStatus::Paused,
            "pause",
            EventType::AgentPaused,
        )
        .await
    }

    /// Accept work again. Only allowed from `Paused`.
    pub async fn resume(&self) -> ConductorResult<()> {
        self.simple_transition(
            AgentStatus::Paused,
            AgentStatus::Running,
            "resume",
            EventType::AgentResumed,
        )
        .await
    }

    async fn simple_transition(
        &self,
        from: AgentStatus,
        to: AgentStatus,
        action: &'static str,
        event: EventType,
    ) -> ConductorResult<()> {
        let _guard = self.transition.lock().await;
        let current = self.status();
        if current != from {
            return Err(ConductorError::InvalidTransition {
                from: current,
                action,
            });
        }
        self.set_status(to);
        info!(agent_id = %self.id(), name = %self.name(), status = %to, "Agent {action}d");
        self.emit(event, None);
        Ok(())
    }

    /// Enter `ShuttingDown` and run the worker's shutdown hook.
    ///
    /// On hook failure the agent stays in `ShuttingDown` and an error is
    /// returned, unless `force` is set, in which case it is stopped anyway.
    /// Calling this on a stopped agent is a no-op.
    pub async fn shutdown(&self, force: bool) -> ConductorResult<()> {
        let _guard = self.transition.lock().await;
        let current = self.status();
        match current {
            AgentStatus::Stopped => {
                debug!(agent_id = %self.id(), "Agent already stopped");
                return Ok(());
            }
            AgentStatus::Initializing => {
                return Err(ConductorError::InvalidTransition {
                    from: current,
                    action: "shut down",
                });
            }
            _ => {}
        }

        self.set_status(AgentStatus::ShuttingDown);
        self.emit(EventType::AgentShutdown, None);

        match self.worker.on_shutdown().await {
            Ok(()) => {
                self.set_status(AgentStatus::Stopped);
                info!(agent_id = %self.id(), name = %self.name(), "Agent stopped");
                self.emit(EventType::AgentStopped, None);
                Ok(())
            }
            Err(e) if force => {
                warn!(agent_id = %self.id(), error = %e, "Shutdown hook failed, forcing stop");
                self.set_status(AgentStatus::Stopped);
                self.emit(EventType::AgentStopped, Some(e.to_string()));
                Ok(())
            }
            Err(e) => {
                warn!(
                    agent_id = %self.id(),
                    error = %e,
                    "Shutdown hook failed, agent left shutting down"
                );
                Err(ConductorError::AgentShutdown(e.to_string()))
            }
        }
    }

    /// Run a task on the underlying worker.
    pub async fn execute_task(
        &self,
        task: &Task,
        context: Option<&serde_json::Value>,
    ) -> ConductorResult<serde_json::Value> {
        self.worker.execute_task(task, context).await
    }

    fn set_status(&self, status: AgentStatus) {
        self.lifecycle.write().status = status;
    }

    // The lifecycle lock is released before publishing so subscribers may read status.
    fn emit(&self, event_type: EventType, error: Option<String>) {
        let mut payload = serde_json::json!({
            "agent_id": self.id(),
            "name": self.name(),
            "agent_type": self.descriptor.agent_type,
            "status": self.status(),
        });
        if let Some(error) = error {
            payload["error"] = serde_json::Value::String(error);
        }
        self.events
            .publish(event_type, self.id().to_string(), payload, None);
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("descriptor", &self.descriptor)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
