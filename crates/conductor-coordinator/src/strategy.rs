//! Agent selection strategies.
//!
//! Each strategy picks from the directory's current snapshot of running
//! agents, in registration order. No candidate is not an error: the entry
//! simply stays queued for the next pass.

use crate::config::SelectionStrategy;
use crate::monitor::LoadTracker;
use conductor_agent::{Agent, AgentDirectory};
use conductor_core::{AgentId, AgentStatus, Capability};
use std::sync::Arc;

/// Pick an agent for a task requiring `capability`.
pub fn select_agent(
    strategy: SelectionStrategy,
    directory: &dyn AgentDirectory,
    capability: &Capability,
    loads: &LoadTracker,
    cursor: Option<AgentId>,
) -> Option<Arc<Agent>> {
    let running = directory.find_agents_by_status(AgentStatus::Running);
    match strategy {
        SelectionStrategy::CapabilityMatch => {
            let capable = running.into_iter().filter(|a| a.has_capability(capability));
            least_loaded(capable, loads)
        }
        SelectionStrategy::Priority => highest_priority(running),
        SelectionStrategy::RoundRobin => next_after(running, cursor),
        SelectionStrategy::LoadBalanced => least_loaded(running.into_iter(), loads),
    }
}

/// Lowest load counter; the first found wins ties.
fn least_loaded(
    candidates: impl Iterator<Item = Arc<Agent>>,
    loads: &LoadTracker,
) -> Option<Arc<Agent>> {
    candidates.min_by_key(|a| loads.load(a.id()))
}

/// Highest agent priority; the first found wins ties.
fn highest_priority(candidates: Vec<Arc<Agent>>) -> Option<Arc<Agent>> {
    candidates
        .into_iter()
        .reduce(|best, a| if a.priority() > best.priority() { a } else { best })
}

/// The agent after `cursor`, wrapping around. Restarts at index 0 when the
/// cursor agent is no longer in the snapshot.
fn next_after(candidates: Vec<Arc<Agent>>, cursor: Option<AgentId>) -> Option<Arc<Agent>> {
    if candidates.is_empty() {
        return None;
    }
    let index = cursor
        .and_then(|id| candidates.iter().position(|a| a.id() == id))
        .map_or(0, |pos| (pos + 1) % candidates.len());
    candidates.into_iter().nth(index)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conductor_agent::{AgentDescriptor, AgentRegistry, Worker};
    use conductor_core::{ConductorResult, Task};
    use conductor_events::EventChannel;

    struct NoopWorker;

    #[async_trait]
    impl Worker for NoopWorker {
        async fn execute_task(
            &self,
            _task: &Task,
            _context: Option<&serde_json::Value>,
        ) -> ConductorResult<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
    }

    async fn running(
        registry: &AgentRegistry,
        events: &Arc<EventChannel>,
        name: &str,
        caps: &[&str],
        priority: i32,
    ) -> Arc<Agent> {
        let descriptor = AgentDescriptor::new(name, "test", caps.iter().copied(), priority);
        let agent = Arc::new(Agent::new(descriptor, Arc::new(NoopWorker), events.clone()));
        agent.start().await.unwrap();
        registry.register(agent.clone());
        agent
    }

    fn pick(
        strategy: SelectionStrategy,
        registry: &AgentRegistry,
        cap: &str,
        loads: &LoadTracker,
        cursor: Option<AgentId>,
    ) -> Option<String> {
        select_agent(strategy, registry, &Capability::from(cap), loads, cursor)
            .map(|a| a.name().to_string())
    }

    #[tokio::test]
    async fn test_capability_match_prefers_lowest_load() {
        let events = Arc::new(EventChannel::default());
        let registry = AgentRegistry::new();
        let a = running(&registry, &events, "a", &["gis"], 0).await;
        running(&registry, &events, "b", &["gis"], 0).await;
        running(&registry, &events, "c", &["valuation"], 0).await;

        let mut loads = LoadTracker::new();
        assert_eq!(
            pick(SelectionStrategy::CapabilityMatch, &registry, "gis", &loads, None).as_deref(),
            Some("a")
        );

        loads.assign(a.id());
        assert_eq!(
            pick(SelectionStrategy::CapabilityMatch, &registry, "gis", &loads, None).as_deref(),
            Some("b")
        );
        assert_eq!(
            pick(SelectionStrategy::CapabilityMatch, &registry, "report", &loads, None),
            None
        );
    }

    #[tokio::test]
    async fn test_capability_match_skips_non_running() {
        let events = Arc::new(EventChannel::default());
        let registry = AgentRegistry::new();
        let a = running(&registry, &events, "a", &["gis"], 0).await;
        running(&registry, &events, "b", &["gis"], 0).await;
        a.pause().await.unwrap();

        let loads = LoadTracker::new();
        assert_eq!(
            pick(SelectionStrategy::CapabilityMatch, &registry, "gis", &loads, None).as_deref(),
            Some("b")
        );
    }

    #[tokio::test]
    async fn test_priority_first_found_on_ties() {
        let events = Arc::new(EventChannel::default());
        let registry = AgentRegistry::new();
        running(&registry, &events, "low", &["x"], 1).await;
        running(&registry, &events, "high-1", &["y"], 9).await;
        running(&registry, &events, "high-2", &["z"], 9).await;

        let loads = LoadTracker::new();
        assert_eq!(
            pick(SelectionStrategy::Priority, &registry, "x", &loads, None).as_deref(),
            Some("high-1")
        );
    }

    #[tokio::test]
    async fn test_round_robin_cycles_and_restarts() {
        let events = Arc::new(EventChannel::default());
        let registry = AgentRegistry::new();
        let a = running(&registry, &events, "a", &["x"], 0).await;
        let b = running(&registry, &events, "b", &["x"], 0).await;

        let loads = LoadTracker::new();
        assert_eq!(
            pick(SelectionStrategy::RoundRobin, &registry, "x", &loads, None).as_deref(),
            Some("a")
        );
        assert_eq!(
            pick(SelectionStrategy::RoundRobin, &registry, "x", &loads, Some(a.id())).as_deref(),
            Some("b")
        );
        assert_eq!(
            pick(SelectionStrategy::RoundRobin, &registry, "x", &loads, Some(b.id())).as_deref(),
            Some("a")
        );
        // Cursor agent vanished
        let vanished = Some(AgentId::new());
        assert_eq!(
            pick(SelectionStrategy::RoundRobin, &registry, "x", &loads, vanished).as_deref(),
            Some("a")
        );
    }

    #[tokio::test]
    async fn test_load_balanced_ignores_capability() {
        let events = Arc::new(EventChannel::default());
        let registry = AgentRegistry::new();
        let a = running(&registry, &events, "a", &["x"], 0).await;
        running(&registry, &events, "b", &["y"], 0).await;

        let mut loads = LoadTracker::new();
        loads.assign(a.id());
        loads.assign(a.id());
        assert_eq!(
            pick(SelectionStrategy::LoadBalanced, &registry, "x", &loads, None).as_deref(),
            Some("b")
        );
    }

    #[tokio::test]
    async fn test_no_running_agents() {
        let registry = AgentRegistry::new();
        let loads = LoadTracker::new();
        for strategy in [
            SelectionStrategy::CapabilityMatch,
            SelectionStrategy::Priority,
            SelectionStrategy::RoundRobin,
            SelectionStrategy::LoadBalanced,
        ] {
            assert!(pick(strategy, &registry, "x", &loads, None).is_none());
        }
    }
}
