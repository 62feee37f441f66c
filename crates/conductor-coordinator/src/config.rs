use conductor_core::{Capability, ConductorError, ConductorResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Algorithm choosing which running agent receives a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Agents advertising the required capability; lowest load wins.
    #[default]
    CapabilityMatch,
    /// Agent with the highest configured priority.
    Priority,
    /// Next agent after the last one chosen.
    RoundRobin,
    /// Agent with the lowest load counter.
    LoadBalanced,
}

impl std::fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionStrategy::CapabilityMatch => write!(f, "capability_match"),
            SelectionStrategy::Priority => write!(f, "priority"),
            SelectionStrategy::RoundRobin => write!(f, "round_robin"),
            SelectionStrategy::LoadBalanced => write!(f, "load_balanced"),
        }
    }
}

impl FromStr for SelectionStrategy {
    type Err = ConductorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "capability_match" | "capability" => Ok(SelectionStrategy::CapabilityMatch),
            "priority" => Ok(SelectionStrategy::Priority),
            "round_robin" => Ok(SelectionStrategy::RoundRobin),
            "load_balanced" => Ok(SelectionStrategy::LoadBalanced),
            other => Err(ConductorError::Config(format!(
                "Unknown selection strategy '{other}'"
            ))),
        }
    }
}

/// Coordinator settings, usually the `[coordinator]` table of `conductor.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Submissions are rejected once this many entries are queued.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    /// Maximum execution attempts per task; the attempt that reaches it is terminal.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub default_selection_strategy: SelectionStrategy,
    /// Interval of the periodic scheduling pass.
    #[serde(default = "default_task_poll_interval_ms")]
    pub task_poll_interval_ms: u64,
    /// Reserved; scheduling does not enforce execution timeouts.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Completed results kept before the oldest is evicted. `0` keeps everything.
    #[serde(default = "default_max_completed_results")]
    pub max_completed_results: usize,
    /// Task type -> required capability.
    #[serde(default)]
    pub capability_map: HashMap<String, String>,
    /// Reject task types missing from `capability_map` instead of using the type name.
    #[serde(default)]
    pub require_explicit_capability: bool,
}

fn default_max_queue_size() -> usize {
    1000
}
fn default_max_retries() -> u32 {
    3
}
fn default_task_poll_interval_ms() -> u64 {
    1000
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_max_completed_results() -> usize {
    10_000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            max_retries: default_max_retries(),
            default_selection_strategy: SelectionStrategy::default(),
            task_poll_interval_ms: default_task_poll_interval_ms(),
            default_timeout_ms: default_timeout_ms(),
            max_completed_results: default_max_completed_results(),
            capability_map: HashMap::new(),
            require_explicit_capability: false,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> ConductorResult<()> {
        if self.max_queue_size == 0 {
            return Err(ConductorError::Config(
                "max_queue_size must be greater than zero".to_string(),
            ));
        }
        if self.task_poll_interval_ms == 0 {
            return Err(ConductorError::Config(
                "task_poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if let Some((task_type, _)) = self
            .capability_map
            .iter()
            .find(|(_, cap)| cap.trim().is_empty())
        {
            return Err(ConductorError::Config(format!(
                "capability_map entry for '{task_type}' is empty"
            )));
        }
        Ok(())
    }
}

/// Maps task types to the capability an agent needs to run them.
///
/// Resolution happens at submission time, so an unknown type is rejected
/// before it ever reaches the queue.
#[derive(Debug, Clone, Default)]
pub struct CapabilityResolver {
    map: HashMap<String, Capability>,
    strict: bool,
}

impl CapabilityResolver {
    pub fn new(map: &HashMap<String, String>, strict: bool) -> Self {
        Self {
            map: map
                .iter()
                .map(|(task_type, cap)| (task_type.clone(), Capability::new(cap.trim())))
                .collect(),
            strict,
        }
    }

    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self::new(&config.capability_map, config.require_explicit_capability)
    }

    pub fn resolve(&self, task_type: &str) -> ConductorResult<Capability> {
        if let Some(cap) = self.map.get(task_type) {
            return Ok(cap.clone());
        }
        if self.strict || task_type.trim().is_empty() {
            return Err(ConductorError::UnknownTaskType(task_type.to_string()));
        }
        Ok(Capability::new(task_type))
    }
}
