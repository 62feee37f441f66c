use async_trait::async_trait;
use conductor_core::{ConductorResult, Task};

/// The execution extension point implemented by domain-specific agents.
///
/// The coordinator treats `execute_task` as an opaque asynchronous operation
/// that eventually succeeds with a JSON value or fails with an error. What a
/// worker returns for a given capability is outside the engine's concern.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Called by [`Agent::start`](crate::Agent::start). An error moves the agent to `Error`.
    async fn initialize(&self) -> ConductorResult<()> {
        Ok(())
    }

    /// Called by [`Agent::shutdown`](crate::Agent::shutdown) after the agent enters `ShuttingDown`.
    async fn on_shutdown(&self) -> ConductorResult<()> {
        Ok(())
    }

    /// Execute one task. `context` is the optional execution context given at submission.
    async fn execute_task(
        &self,
        task: &Task,
        context: Option<&serde_json::Value>,
    ) -> ConductorResult<serde_json::Value>;
}
