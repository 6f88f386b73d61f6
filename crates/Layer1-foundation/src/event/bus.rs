//! Event Broadcaster - task event fan-out
//!
//! Clients subscribe to a shared broadcaster; every published event is delivered
//! synchronously to all current subscribers in subscription order. There is no
//! replay: a client only sees events published after it subscribed.

use super::types::{TaskEvent, TaskExitEvent, TaskOutputEntryEvent};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

// ============================================================================
// TaskClient Trait
// ============================================================================

/// Subscription ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Receiver of task events
///
/// One method per event kind, so implementations stay exhaustive. Both methods
/// are called on the publishing thread and must not block.
pub trait TaskClient: Send + Sync {
    /// Client name (for logs)
    fn name(&self) -> &str {
        "client"
    }

    fn on_task_exit(&self, event: &TaskExitEvent);

    fn on_task_output_entry_found(&self, event: &TaskOutputEntryEvent);
}

/// Client that forwards every event into an unbounded channel
pub struct ChannelClient {
    tx: mpsc::UnboundedSender<TaskEvent>,
}

impl ChannelClient {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TaskClient for ChannelClient {
    fn name(&self) -> &str {
        "channel"
    }

    fn on_task_exit(&self, event: &TaskExitEvent) {
        let _ = self.tx.send(TaskEvent::Exited(event.clone()));
    }

    fn on_task_output_entry_found(&self, event: &TaskOutputEntryEvent) {
        let _ = self.tx.send(TaskEvent::OutputEntryFound(event.clone()));
    }
}

// ============================================================================
// EventBroadcaster
// ============================================================================

/// Fan-out of task events to subscribed clients
///
/// ## Usage
///
/// ```ignore
/// use taskforge_foundation::event::{EventBroadcaster, ChannelClient};
///
/// let events = EventBroadcaster::new();
/// let (id, mut rx) = events.channel();
///
/// events.publish(TaskEvent::Exited(exit));
/// let event = rx.recv().await;
///
/// events.unsubscribe(id);
/// ```
pub struct EventBroadcaster {
    /// Subscribed clients, ordered by subscription
    clients: RwLock<BTreeMap<SubscriptionId, Arc<dyn TaskClient>>>,

    /// Subscription counter
    counter: AtomicU64,

    /// Number of published events
    event_count: AtomicU64,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(BTreeMap::new()),
            counter: AtomicU64::new(0),
            event_count: AtomicU64::new(0),
        }
    }

    /// Subscribe a client
    pub fn subscribe(&self, client: Arc<dyn TaskClient>) -> SubscriptionId {
        let id = SubscriptionId(self.counter.fetch_add(1, Ordering::SeqCst));

        debug!(client = client.name(), subscription = %id, "Subscribing task client");

        self.clients.write().insert(id, client);
        id
    }

    /// Subscribe a channel-backed client and return its receiving end
    pub fn channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<TaskEvent>) {
        let (client, rx) = ChannelClient::new();
        (self.subscribe(Arc::new(client)), rx)
    }

    /// Unsubscribe a client
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.clients.write().remove(&id).is_some();

        if removed {
            debug!(subscription = %id, "Unsubscribed task client");
        }

        removed
    }

    /// Publish an event to every current subscriber
    pub fn publish(&self, event: TaskEvent) {
        self.event_count.fetch_add(1, Ordering::SeqCst);

        // Snapshot so clients may (un)subscribe from inside a callback
        let clients: Vec<(SubscriptionId, Arc<dyn TaskClient>)> = self
            .clients
            .read()
            .iter()
            .map(|(id, client)| (*id, Arc::clone(client)))
            .collect();

        for (id, client) in clients {
            trace!(
                subscription = %id,
                client = client.name(),
                task_id = %event.task_id(),
                "Delivering task event"
            );

            match &event {
                TaskEvent::Exited(e) => client.on_task_exit(e),
                TaskEvent::OutputEntryFound(e) => client.on_task_output_entry_found(e),
            }
        }
    }

    pub fn publish_exit(&self, event: TaskExitEvent) {
        self.publish(TaskEvent::Exited(event));
    }

    pub fn publish_entry(&self, event: TaskOutputEntryEvent) {
        self.publish(TaskEvent::OutputEntryFound(event));
    }

    /// Number of subscribed clients
    pub fn subscriber_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Total number of published events
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::SeqCst)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::types::{ParsedEntry, Severity, TaskId};
    use parking_lot::Mutex;
    use std::path::PathBuf;

    struct RecordingClient {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl TaskClient for RecordingClient {
        fn name(&self) -> &str {
            &self.name
        }

        fn on_task_exit(&self, event: &TaskExitEvent) {
            self.log
                .lock()
                .push(format!("{}:exit:{}", self.name, event.task_id));
        }

        fn on_task_output_entry_found(&self, event: &TaskOutputEntryEvent) {
            self.log
                .lock()
                .push(format!("{}:entry:{}", self.name, event.entry.line));
        }
    }

    fn exit(id: u64) -> TaskEvent {
        TaskEvent::Exited(TaskExitEvent {
            task_id: TaskId(id),
            code: Some(0),
            signal: None,
        })
    }

    fn entry(id: u64, line: u32) -> TaskEvent {
        TaskEvent::OutputEntryFound(TaskOutputEntryEvent {
            task_id: TaskId(id),
            entry: ParsedEntry {
                owner: "tsc".to_string(),
                file: PathBuf::from("/src/a.ts"),
                line,
                column: 1,
                code: None,
                message: "boom".to_string(),
                severity: Severity::Error,
            },
        })
    }

    #[test]
    fn test_fan_out_in_subscription_order() {
        let bus = EventBroadcaster::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["a", "b", "c"] {
            bus.subscribe(Arc::new(RecordingClient {
                name: name.to_string(),
                log: Arc::clone(&log),
            }));
        }

        bus.publish(entry(1, 12));
        bus.publish(exit(1));

        assert_eq!(
            *log.lock(),
            vec![
                "a:entry:12",
                "b:entry:12",
                "c:entry:12",
                "a:exit:1",
                "b:exit:1",
                "c:exit:1"
            ]
        );
        assert_eq!(bus.event_count(), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBroadcaster::new();
        let (id, mut rx) = bus.channel();
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(exit(1));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(exit(2));

        assert_eq!(rx.try_recv().unwrap(), exit(1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let bus = EventBroadcaster::new();
        bus.publish(exit(1));

        let (_id, mut rx) = bus.channel();
        assert!(rx.try_recv().is_err());

        bus.publish(exit(2));
        assert_eq!(rx.try_recv().unwrap().task_id(), TaskId(2));
    }
}
