//! Watch events and pub/sub coordination for the Kubelab controllers.
//!
//! This crate carries the change feed between the object store and the
//! components that react to it:
//!
//! - **Watch events**: `Applied`/`Deleted` notifications for any stored object
//! - **Event bus**: Pub/sub with per-kind subscribers
//! - **Event store**: Optional bounded journal of published events
//!
//! # Example
//!
//! ```ignore
//! use kubelab_events::{EventBus, EventPattern, ObjectRef, WatchEvent};
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = EventBus::new();
//!
//!     let (_id, mut sub) = bus
//!         .subscribe_with_pattern(EventPattern::ByKind("Account".into()))
//!         .await;
//!
//!     let object = ObjectRef::cluster("Account", "alice");
//!     bus.publish(WatchEvent::applied(object, serde_json::json!({}))).await.ok();
//!
//!     let event = sub.recv().await;
//!     println!("Received: {:?}", event.map(|e| e.event_type()));
//! }
//! ```

#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod bus;
pub mod error;
pub mod event;
pub mod store;
pub mod types;

// Re-export main types
pub use bus::{EventBus, EventBusBuilder, EventPattern, EventSubscription};
pub use error::{Error, Result};
pub use event::WatchEvent;
pub use store::{EventStore, InMemoryEventStore};
pub use types::{EventId, ObjectRef, OwnerRef};
