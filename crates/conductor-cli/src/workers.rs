use crate::config::{AgentConfig, Behavior};
use async_trait::async_trait;
use conductor_agent::Worker;
use conductor_core::{ConductorError, ConductorResult, Task};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Worker driven by an `[[agents]]` behavior setting.
pub struct DemoWorker {
    name: String,
    behavior: Behavior,
    delay: Duration,
}

impl DemoWorker {
    pub fn from_config(config: &AgentConfig) -> Arc<Self> {
        Arc::new(Self {
            name: config.name.clone(),
            behavior: config.behavior,
            delay: Duration::from_millis(config.delay_ms),
        })
    }
}

#[async_trait]
impl Worker for DemoWorker {
    async fn execute_task(
        &self,
        task: &Task,
        context: Option<&serde_json::Value>,
    ) -> ConductorResult<serde_json::Value> {
        debug!(worker = %self.name, task_id = %task.id, behavior = ?self.behavior, "Executing");
        match self.behavior {
            Behavior::Fail => {
                return Err(ConductorError::Execution(format!(
                    "{} cannot handle '{}'",
                    self.name, task.task_type
                )));
            }
            Behavior::Sleep => tokio::time::sleep(self.delay).await,
            Behavior::Echo => {}
        }
        Ok(serde_json::json!({
            "worker": self.name,
            "task_type": task.task_type,
            "payload": task.payload,
            "context": context,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn agent_config(behavior: Behavior) -> AgentConfig {
        AgentConfig {
            name: "demo-1".into(),
            agent_type: "demo".into(),
            capabilities: vec!["x".into()],
            priority: 0,
            behavior,
            delay_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_echo_returns_payload() {
        let worker = DemoWorker::from_config(&agent_config(Behavior::Echo));
        let task = Task::new("x", 0, serde_json::json!({"parcel": 12}));
        let out = worker
            .execute_task(&task, Some(&serde_json::json!("ctx")))
            .await
            .unwrap();
        assert_eq!(out["payload"]["parcel"], 12);
        assert_eq!(out["context"], "ctx");
        assert_eq!(out["worker"], "demo-1");
    }

    #[tokio::test]
    async fn test_fail_behavior() {
        let worker = DemoWorker::from_config(&agent_config(Behavior::Fail));
        let task = Task::new("x", 0, serde_json::Value::Null);
        let err = worker.execute_task(&task, None).await.unwrap_err();
        assert!(matches!(err, ConductorError::Execution(_)));
    }

    #[tokio::test]
    async fn test_sleep_then_echo() {
        let worker = DemoWorker::from_config(&agent_config(Behavior::Sleep));
        let task = Task::new("x", 0, serde_json::Value::Null);
        assert!(worker.execute_task(&task, None).await.is_ok());
    }
}
