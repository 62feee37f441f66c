//! Agents and the registry publishing onto a shared event channel.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use conductor_agent::{Agent, AgentDescriptor, AgentDirectory, AgentRegistry, Worker};
use conductor_core::{AgentStatus, Capability, ConductorResult, Task};
use conductor_events::{AgentEvent, EventChannel, EventType, Topic};
use parking_lot::Mutex;
use std::sync::Arc;

struct IdleWorker;

#[async_trait]
impl Worker for IdleWorker {
    async fn execute_task(
        &self,
        _task: &Task,
        _context: Option<&serde_json::Value>,
    ) -> ConductorResult<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }
}

fn agent(events: &Arc<EventChannel>, name: &str, caps: &[&str]) -> Arc<Agent> {
    let descriptor = AgentDescriptor::new(name, "idle", caps.iter().copied(), 0);
    Arc::new(Agent::new(descriptor, Arc::new(IdleWorker), events.clone()))
}

#[tokio::test]
async fn test_full_lifecycle_is_published_in_order() {
    let events = Arc::new(EventChannel::default());
    let seen: Arc<Mutex<Vec<(EventType, AgentStatus)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    events.subscribe(Topic::All, move |event: &AgentEvent| {
        let status = serde_json::from_value(event.payload["status"].clone())?;
        sink.lock().push((event.event_type.clone(), status));
        Ok(())
    });

    let a = agent(&events, "mapper", &["gis_repair"]);
    a.start().await.unwrap();
    a.pause().await.unwrap();
    a.resume().await.unwrap();
    a.shutdown(false).await.unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            (EventType::AgentStarted, AgentStatus::Running),
            (EventType::AgentPaused, AgentStatus::Paused),
            (EventType::AgentResumed, AgentStatus::Running),
            (EventType::AgentShutdown, AgentStatus::ShuttingDown),
            (EventType::AgentStopped, AgentStatus::Stopped),
        ]
    );

    let history = events.recent_events(10, None, Some(&a.id().to_string()));
    assert_eq!(history.len(), 5);
    assert_eq!(history[0].payload["name"], "mapper");
}

#[tokio::test]
async fn test_directory_reflects_live_status() {
    let events = Arc::new(EventChannel::default());
    let registry = AgentRegistry::new();
    let gis = agent(&events, "gis", &["gis_repair"]);
    let valuer = agent(&events, "valuer", &["valuation", "gis_repair"]);
    registry.register(gis.clone());
    registry.register(valuer.clone());

    assert!(registry.start_all().await.is_empty());
    assert_eq!(registry.find_agents_by_status(AgentStatus::Running).len(), 2);

    gis.pause().await.unwrap();
    let running = registry.find_agents_by_status(AgentStatus::Running);
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].id(), valuer.id());

    let capable = registry.find_agents_by_capability(&Capability::from("gis_repair"));
    assert_eq!(capable.len(), 2);
    assert_eq!(capable[0].id(), gis.id());

    assert!(registry.shutdown_all(false).await.is_empty());
    assert!(registry.find_agents_by_status(AgentStatus::Running).is_empty());
    assert_eq!(
        registry.get_agent_instance_by_id(gis.id()).unwrap().status(),
        AgentStatus::Stopped
    );
}

#[tokio::test]
async fn test_restart_after_stop() {
    let events = Arc::new(EventChannel::default());
    let a = agent(&events, "restartable", &["x"]);
    a.start().await.unwrap();
    let first_start = a.started_at().unwrap();
    a.shutdown(false).await.unwrap();

    a.start().await.unwrap();
    assert_eq!(a.status(), AgentStatus::Running);
    assert!(a.started_at().unwrap() >= first_start);
    assert_eq!(
        events
            .recent_events(10, Some(&EventType::AgentStarted), None)
            .len(),
        2
    );
}
