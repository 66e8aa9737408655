//! Event journal trait and the bounded in-memory ring.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::event::WatchEvent;
use crate::types::EventId;

/// Trait for event journal backends.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an event to the journal.
    async fn append(&self, event: WatchEvent) -> Result<EventId>;

    /// Read retained events published after a given event ID (all for `None`).
    async fn read(&self, from: Option<EventId>) -> Result<Vec<WatchEvent>>;

    /// Number of events appended since creation, including evicted ones.
    async fn count(&self) -> Result<usize>;
}

struct Ring {
    events: VecDeque<WatchEvent>,
    appended: usize,
}

/// In-memory journal keeping the newest `capacity` events.
pub struct InMemoryEventStore {
    capacity: usize,
    ring: RwLock<Ring>,
}

impl InMemoryEventStore {
    /// Journal retaining at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ring: RwLock::new(Ring {
                events: VecDeque::with_capacity(capacity),
                appended: 0,
            }),
        }
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: WatchEvent) -> Result<EventId> {
        if self.capacity == 0 {
            return Err(Error::invalid_event("journal capacity is 0"));
        }
        let event_id = event.event_id();

        let mut ring = self.ring.write().await;
        if ring.events.len() >= self.capacity {
            ring.events.pop_front();
        }
        ring.events.push_back(event);
        ring.appended = ring.appended.saturating_add(1);

        Ok(event_id)
    }

    async fn read(&self, from: Option<EventId>) -> Result<Vec<WatchEvent>> {
        let ring = self.ring.read().await;

        let start = from
            .and_then(|from_id| ring.events.iter().position(|e| e.event_id() == from_id))
            .map_or(0, |pos| pos.saturating_add(1));

        Ok(ring.events.iter().skip(start).cloned().collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.ring.read().await.appended)
    }
}
