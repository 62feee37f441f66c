use conductor_coordinator::CoordinatorConfig;
use conductor_events::DEFAULT_HISTORY_CAPACITY;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Contents of `conductor.toml`.
#[derive(Debug, Deserialize)]
pub struct ConductorFileConfig {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

#[derive(Debug, Deserialize)]
pub struct EventsConfig {
    /// Events kept in the channel's in-memory history.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
        }
    }
}

/// One `[[agents]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default = "default_agent_type")]
    pub agent_type: String,
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub behavior: Behavior,
    /// Used by the `sleep` behavior.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

/// What a demo worker does with each task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Return the task payload.
    #[default]
    Echo,
    /// Fail every attempt.
    Fail,
    /// Wait `delay_ms`, then echo.
    Sleep,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}
fn default_agent_type() -> String {
    "demo".to_string()
}
fn default_delay_ms() -> u64 {
    100
}

impl ConductorFileConfig {
    /// Read and parse a config file, then validate it.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {e}", path.display())
        })?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.coordinator.validate()?;
        let mut names = HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                anyhow::bail!("Agent names must not be empty");
            }
            if !names.insert(agent.name.as_str()) {
                anyhow::bail!("Duplicate agent name '{}'", agent.name);
            }
            if agent.capabilities.iter().any(|c| c.trim().is_empty()) {
                anyhow::bail!("Agent '{}' lists an empty capability", agent.name);
            }
        }
        Ok(())
    }
}
