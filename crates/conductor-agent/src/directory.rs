use crate::agent::Agent;
use conductor_core::{AgentId, AgentStatus, Capability, ConductorError};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

/// Lookup interface the coordinator uses to find agents.
///
/// Results are returned in registration order so that strategies breaking
/// ties by "first found" behave deterministically.
pub trait AgentDirectory: Send + Sync {
    fn find_agents_by_capability(&self, capability: &Capability) -> Vec<Arc<Agent>>;
    fn find_agents_by_status(&self, status: AgentStatus) -> Vec<Arc<Agent>>;
    fn get_agent_instance_by_id(&self, id: AgentId) -> Option<Arc<Agent>>;
}

/// In-memory agent directory.
///
/// Agents publish their own lifecycle events on the channel they were built
/// with, so sharing that channel with the coordinator is all the wiring needed.
pub struct AgentRegistry {
    agents: RwLock<Vec<Arc<Agent>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(Vec::new()),
        }
    }

    /// Register an agent. Re-registering an id replaces the previous instance in place.
    pub fn register(&self, agent: Arc<Agent>) {
        let mut agents = self.agents.write();
        info!(agent_id = %agent.id(), name = %agent.name(), "Registered agent");
        if let Some(slot) = agents.iter_mut().find(|a| a.id() == agent.id()) {
            *slot = agent;
        } else {
            agents.push(agent);
        }
    }

    /// Remove an agent from the directory. Returns the removed instance.
    pub fn unregister(&self, id: AgentId) -> Option<Arc<Agent>> {
        let mut agents = self.agents.write();
        let pos = agents.iter().position(|a| a.id() == id)?;
        Some(agents.remove(pos))
    }

    pub fn all(&self) -> Vec<Arc<Agent>> {
        self.agents.read().clone()
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }

    /// Start every registered agent.
    /// Errors from individual agents are collected and returned together.
    pub async fn start_all(&self) -> Vec<ConductorError> {
        let mut errors = Vec::new();
        for agent in self.all() {
            if let Err(e) = agent.start().await {
                warn!(agent_id = %agent.id(), error = %e, "Agent failed to start");
                errors.push(e);
            }
        }
        errors
    }

    /// Shut down every registered agent that is not already stopped.
    pub async fn shutdown_all(&self, force: bool) -> Vec<ConductorError> {
        let mut errors = Vec::new();
        for agent in self.all() {
            if agent.status() == AgentStatus::Initializing {
                continue;
            }
            if let Err(e) = agent.shutdown(force).await {
                warn!(agent_id = %agent.id(), error = %e, "Agent failed to shut down");
                errors.push(e);
            }
        }
        errors
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentDirectory for AgentRegistry {
    fn find_agents_by_capability(&self, capability: &Capability) -> Vec<Arc<Agent>> {
        self.agents
            .read()
            .iter()
            .filter(|a| a.has_capability(capability))
            .cloned()
            .collect()
    }

    fn find_agents_by_status(&self, status: AgentStatus) -> Vec<Arc<Agent>> {
        self.agents
            .read()
            .iter()
            .filter(|a| a.status() == status)
            .cloned()
            .collect()
    }

    fn get_agent_instance_by_id(&self, id: AgentId) -> Option<Arc<Agent>> {
        self.agents.read().iter().find(|a| a.id() == id).cloned()
    }
}
