use conductor_core::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Load counter and outcome tallies for one agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLoad {
    /// Tasks currently assigned and executing.
    pub in_flight: usize,
    pub completed: u64,
    pub failed: u64,
}

/// Per-agent load counters used by load-aware selection strategies.
///
/// Advisory only: a strategy may still pick a busy agent. Owned by the
/// coordinator's scheduling state and mutated under its lock.
#[derive(Debug, Default)]
pub struct LoadTracker {
    loads: HashMap<AgentId, AgentLoad>,
}

impl LoadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current load counter for an agent (zero if unknown).
    pub fn load(&self, agent: AgentId) -> usize {
        self.loads.get(&agent).map_or(0, |l| l.in_flight)
    }

    /// Mark a task assigned to `agent`.
    pub fn assign(&mut self, agent: AgentId) {
        self.loads.entry(agent).or_default().in_flight += 1;
    }

    /// Mark a task finished on `agent`, recording its outcome.
    pub fn release(&mut self, agent: AgentId, success: bool) {
        let load = self.loads.entry(agent).or_default();
        load.in_flight = load.in_flight.saturating_sub(1);
        if success {
            load.completed += 1;
        } else {
            load.failed += 1;
        }
    }

    /// Forget an agent entirely (it shut down). Returns its in-flight count.
    pub fn remove(&mut self, agent: AgentId) -> usize {
        self.loads.remove(&agent).map_or(0, |l| l.in_flight)
    }

    /// Sum of all in-flight counters.
    pub fn total_in_flight(&self) -> usize {
        self.loads.values().map(|l| l.in_flight).sum()
    }

    pub fn snapshot(&self) -> HashMap<AgentId, AgentLoad> {
        self.loads.clone()
    }
}
