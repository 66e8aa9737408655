//! Fan-out of watch events to controller and index subscribers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use crate::error::{Error, Result};
use crate::event::WatchEvent;
use crate::store::EventStore;
use crate::types::EventId;

const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

struct Subscriber {
    sender: broadcast::Sender<WatchEvent>,
    pattern: EventPattern,
}

/// Receiving end of a subscription.
pub struct EventSubscription {
    receiver: broadcast::Receiver<WatchEvent>,
}

impl EventSubscription {
    /// Receive the next event.
    ///
    /// # Errors
    ///
    /// Returns `Lagged` if events were dropped for this subscriber (it can
    /// keep receiving) or `ChannelClosed` once the bus is gone.
    pub async fn recv(&mut self) -> Result<WatchEvent> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Lagged(skipped) => Error::Lagged { skipped },
            broadcast::error::RecvError::Closed => Error::ChannelClosed,
        })
    }
}

/// Which events a subscriber wants.
#[derive(Debug, Clone)]
pub enum EventPattern {
    /// Every change to every kind.
    All,
    /// Changes to objects of one kind.
    ByKind(String),
}

impl EventPattern {
    /// Check if an event matches this pattern.
    pub fn matches(&self, event: &WatchEvent) -> bool {
        match self {
            Self::All => true,
            Self::ByKind(kind) => event.kind() == kind,
        }
    }
}

/// Publishes store changes to pattern subscribers, optionally journaling them.
pub struct EventBus {
    journal: Option<Arc<dyn EventStore>>,
    subscribers: RwLock<HashMap<String, Subscriber>>,
    next_id: AtomicU64,
    subscriber_capacity: usize,
}

impl EventBus {
    /// Bus without a journal.
    pub fn new() -> Self {
        Self::from_parts(None, DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Bus that appends every published event to `journal` first.
    pub fn journaled(journal: Arc<dyn EventStore>) -> Self {
        Self::from_parts(Some(journal), DEFAULT_SUBSCRIBER_CAPACITY)
    }

    fn from_parts(journal: Option<Arc<dyn EventStore>>, subscriber_capacity: usize) -> Self {
        Self {
            journal,
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            subscriber_capacity,
        }
    }

    /// Publish an event to every matching subscriber.
    ///
    /// Subscribers whose receiving end was dropped are removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal rejects the event.
    pub async fn publish(&self, event: WatchEvent) -> Result<EventId> {
        let event_id = event.event_id();
        if let Some(journal) = &self.journal {
            journal.append(event.clone()).await?;
        }

        debug!(
            event_id = %event_id,
            event_type = event.event_type(),
            object = %event.object(),
            "Publishing event"
        );

        let gone: Vec<String> = {
            let subscribers = self.subscribers.read().await;
            subscribers
                .iter()
                .filter(|(_, sub)| sub.pattern.matches(&event))
                .filter(|(_, sub)| sub.sender.send(event.clone()).is_err())
                .map(|(id, _)| id.clone())
                .collect()
        };

        if !gone.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in &gone {
                debug!(subscriber = %id, "Dropping subscriber without a receiver");
                subscribers.remove(id);
            }
        }

        Ok(event_id)
    }

    /// Subscribe to events matching a pattern.
    ///
    /// The returned id is what `unsubscribe` takes.
    pub async fn subscribe_with_pattern(&self, pattern: EventPattern) -> (String, EventSubscription) {
        let (sender, receiver) = broadcast::channel(self.subscriber_capacity);
        let id = format!("sub_{}", self.next_id.fetch_add(1, Ordering::Relaxed));

        self.subscribers
            .write()
            .await
            .insert(id.clone(), Subscriber { sender, pattern });

        (id, EventSubscription { receiver })
    }

    /// Remove a subscriber.
    pub async fn unsubscribe(&self, subscriber_id: &str) {
        self.subscribers.write().await.remove(subscriber_id);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `EventBus`.
pub struct EventBusBuilder {
    journal: Option<Arc<dyn EventStore>>,
    subscriber_capacity: usize,
}

impl EventBusBuilder {
    /// Create a new builder.
    pub const fn new() -> Self {
        Self {
            journal: None,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
        }
    }

    /// Journal every published event.
    #[must_use]
    pub fn with_journal(mut self, journal: Arc<dyn EventStore>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Set the per-subscriber channel capacity.
    #[must_use]
    pub const fn with_subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = capacity;
        self
    }

    /// Build the event bus.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscriber capacity is zero.
    pub fn build(self) -> Result<EventBus> {
        if self.subscriber_capacity == 0 {
            return Err(Error::invalid_event("subscriber capacity must be greater than 0"));
        }
        Ok(EventBus::from_parts(self.journal, self.subscriber_capacity))
    }
}

impl Default for EventBusBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::InMemoryEventStore;
    use crate::types::ObjectRef;

    fn account_event(name: &str) -> WatchEvent {
        WatchEvent::applied(ObjectRef::cluster("Account", name), serde_json::json!({}))
    }

    fn classroom_event(name: &str) -> WatchEvent {
        WatchEvent::applied(ObjectRef::cluster("Classroom", name), serde_json::json!({}))
    }

    #[test]
    fn should_match_event_by_kind() {
        let event = account_event("alice");
        assert!(EventPattern::All.matches(&event));
        assert!(EventPattern::ByKind("Account".into()).matches(&event));
        assert!(!EventPattern::ByKind("Classroom".into()).matches(&event));
    }

    #[test]
    fn should_reject_zero_capacity() {
        assert!(EventBusBuilder::new().with_subscriber_capacity(0).build().is_err());
        assert!(EventBusBuilder::new().with_subscriber_capacity(1).build().is_ok());
    }

    #[tokio::test]
    async fn should_journal_published_events_when_configured() {
        let journal = Arc::new(InMemoryEventStore::new(8));
        let bus = EventBusBuilder::new().with_journal(journal.clone()).build().unwrap();

        bus.publish(account_event("alice")).await.unwrap();
        bus.publish(classroom_event("networks")).await.unwrap();

        assert_eq!(journal.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn should_only_deliver_matching_events_to_pattern_subscriber() {
        let bus = EventBus::new();
        let (_, mut classrooms) = bus
            .subscribe_with_pattern(EventPattern::ByKind("Classroom".into()))
            .await;
        let (_, mut everything) = bus.subscribe_with_pattern(EventPattern::All).await;

        bus.publish(account_event("alice")).await.unwrap();
        bus.publish(classroom_event("networks")).await.unwrap();

        assert_eq!(classrooms.recv().await.unwrap().kind(), "Classroom");
        assert_eq!(everything.recv().await.unwrap().kind(), "Account");
        assert_eq!(everything.recv().await.unwrap().kind(), "Classroom");
    }

    #[tokio::test]
    async fn should_stop_delivering_after_unsubscribe() {
        let bus = EventBus::new();
        let (id, mut sub) = bus.subscribe_with_pattern(EventPattern::All).await;

        bus.unsubscribe(&id).await;
        bus.publish(account_event("alice")).await.unwrap();

        assert!(matches!(sub.recv().await, Err(Error::ChannelClosed)));
    }

    #[tokio::test]
    async fn should_drop_subscribers_whose_receiver_is_gone() {
        let bus = EventBus::new();
        let (_, sub) = bus.subscribe_with_pattern(EventPattern::All).await;
        let (_, _kept) = bus.subscribe_with_pattern(EventPattern::All).await;
        drop(sub);

        bus.publish(account_event("alice")).await.unwrap();

        assert_eq!(bus.subscribers.read().await.len(), 1);
    }

    #[tokio::test]
    async fn should_report_lag_to_slow_subscriber() {
        let bus = EventBusBuilder::new().with_subscriber_capacity(1).build().unwrap();
        let (_, mut sub) = bus.subscribe_with_pattern(EventPattern::All).await;

        bus.publish(account_event("a")).await.unwrap();
        bus.publish(account_event("b")).await.unwrap();

        assert!(matches!(sub.recv().await, Err(Error::Lagged { skipped: 1 })));
        assert_eq!(sub.recv().await.unwrap().object().name, "b");
    }
}
