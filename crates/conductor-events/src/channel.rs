use crate::event::{AgentEvent, EventType, Topic};
use conductor_core::ConductorResult;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, warn};

/// Default number of events kept in the in-memory history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Callback invoked synchronously for every delivered event.
pub type EventCallback = Arc<dyn Fn(&AgentEvent) -> ConductorResult<()> + Send + Sync>;

/// Predicate deciding whether a subscriber wants a given event.
pub type EventFilter = Arc<dyn Fn(&AgentEvent) -> bool + Send + Sync>;

/// Handle returned by [`EventChannel::subscribe`]; detaches exactly one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    topic: Topic,
    callback: EventCallback,
    filter: Option<EventFilter>,
}

#[derive(Default)]
struct SubscriberTable {
    next_id: u64,
    entries: Vec<Subscriber>,
}

/// Process-wide publish/subscribe channel with a bounded event history.
///
/// Delivery is synchronous on the publishing call: topic subscribers first,
/// then wildcard subscribers, each group in subscription order. A slow
/// subscriber delays every subscriber after it, so callbacks should return
/// quickly or hand work off to a spawned task.
///
/// Callback failures are isolated. An `Err` is logged as a warning and a panic
/// is caught and logged as an error; in both cases delivery continues and the
/// publisher never sees the failure.
pub struct EventChannel {
    subscribers: Mutex<SubscriberTable>,
    history: Mutex<VecDeque<AgentEvent>>,
    history_capacity: usize,
}

impl EventChannel {
    /// Create a channel keeping at most `history_capacity` events.
    pub fn new(history_capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(SubscriberTable::default()),
            history: Mutex::new(VecDeque::with_capacity(history_capacity.min(4096))),
            history_capacity,
        }
    }

    /// Subscribe to a topic. Returns the handle used to unsubscribe.
    pub fn subscribe<F>(&self, topic: impl Into<Topic>, callback: F) -> SubscriptionId
    where
        F: Fn(&AgentEvent) -> ConductorResult<()> + Send + Sync + 'static,
    {
        self.insert(topic.into(), Arc::new(callback), None)
    }

    /// Subscribe to a topic, receiving only events accepted by `filter`.
    pub fn subscribe_filtered<F, P>(
        &self,
        topic: impl Into<Topic>,
        callback: F,
        filter: P,
    ) -> SubscriptionId
    where
        F: Fn(&AgentEvent) -> ConductorResult<()> + Send + Sync + 'static,
        P: Fn(&AgentEvent) -> bool + Send + Sync + 'static,
    {
        self.insert(topic.into(), Arc::new(callback), Some(Arc::new(filter)))
    }

    fn insert(
        &self,
        topic: Topic,
        callback: EventCallback,
        filter: Option<EventFilter>,
    ) -> SubscriptionId {
        let topic = match topic {
            Topic::Type(event_type) => Topic::Type(event_type.normalized()),
            Topic::All => Topic::All,
        };
        let mut table = self.subscribers.lock();
        table.next_id += 1;
        let id = SubscriptionId(table.next_id);
        table.entries.push(Subscriber {
            id,
            topic,
            callback,
            filter,
        });
        id
    }

    /// Detach a subscription. Returns `false` if the handle was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut table = self.subscribers.lock();
        let before = table.entries.len();
        table.entries.retain(|s| s.id != id);
        table.entries.len() != before
    }

    /// Number of live subscriptions (topic and wildcard).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().entries.len()
    }

    /// Publish an event and deliver it to all matching subscribers.
    ///
    /// Returns the stamped event.
    pub fn publish(
        &self,
        event_type: EventType,
        source: impl Into<String>,
        payload: serde_json::Value,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> AgentEvent {
        let event = AgentEvent::new(event_type, source, payload, metadata);
        self.record(event.clone());

        // Snapshot so callbacks can subscribe, unsubscribe or publish re-entrantly.
        let targets: Vec<(SubscriptionId, EventCallback, Option<EventFilter>)> = {
            let table = self.subscribers.lock();
            let topic = Topic::Type(event.event_type.clone());
            let specific = table.entries.iter().filter(|s| s.topic == topic);
            let wildcard = table.entries.iter().filter(|s| s.topic == Topic::All);
            specific
                .chain(wildcard)
                .map(|s| (s.id, s.callback.clone(), s.filter.clone()))
                .collect()
        };

        for (id, callback, filter) in targets {
            if let Some(filter) = filter {
                if !filter(&event) {
                    continue;
                }
            }
            match panic::catch_unwind(AssertUnwindSafe(|| callback(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        subscription = id.0,
                        event_type = %event.event_type,
                        error = %e,
                        "Event subscriber returned an error"
                    );
                }
                Err(payload) => {
                    error!(
                        subscription = id.0,
                        event_type = %event.event_type,
                        panic = %panic_message(payload.as_ref()),
                        "Event subscriber panicked"
                    );
                }
            }
        }

        event
    }

    fn record(&self, event: AgentEvent) {
        if self.history_capacity == 0 {
            return;
        }
        let mut history = self.history.lock();
        while history.len() >= self.history_capacity {
            history.pop_front();
        }
        history.push_back(event);
    }

    /// Up to `count` most recent events matching the filters, oldest first.
    pub fn recent_events(
        &self,
        count: usize,
        type_filter: Option<&EventType>,
        source_filter: Option<&str>,
    ) -> Vec<AgentEvent> {
        let type_filter = type_filter.map(|t| t.clone().normalized());
        let history = self.history.lock();
        let mut matched: Vec<AgentEvent> = history
            .iter()
            .rev()
            .filter(|e| type_filter.as_ref().map_or(true, |t| &e.event_type == t))
            .filter(|e| source_filter.map_or(true, |s| e.source == s))
            .take(count)
            .cloned()
            .collect();
        matched.reverse();
        matched
    }

    /// Number of events currently held in history.
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    /// Drop all recorded history. Subscriptions are unaffected.
    pub fn clear_history(&self) {
        self.history.lock().clear();
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
