//! Watch event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EventId, ObjectRef, OwnerRef};

/// Change notification for a stored object.
///
/// `body` is the full serialized object as it looked after the change
/// (or right before removal for `Deleted`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WatchEvent {
    /// The object was created or modified.
    Applied {
        event_id: EventId,
        object: ObjectRef,
        owner: Option<OwnerRef>,
        body: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    /// The object was removed from the store.
    Deleted {
        event_id: EventId,
        object: ObjectRef,
        owner: Option<OwnerRef>,
        body: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
}

impl WatchEvent {
    /// Create an applied event.
    pub fn applied(object: ObjectRef, body: serde_json::Value) -> Self {
        Self::Applied {
            event_id: EventId::new(),
            object,
            owner: None,
            body,
            timestamp: Utc::now(),
        }
    }

    /// Create a deleted event.
    pub fn deleted(object: ObjectRef, body: serde_json::Value) -> Self {
        Self::Deleted {
            event_id: EventId::new(),
            object,
            owner: None,
            body,
            timestamp: Utc::now(),
        }
    }

    /// Attach the owner of the changed object.
    #[must_use]
    pub fn with_owner(mut self, owner: Option<OwnerRef>) -> Self {
        match &mut self {
            Self::Applied { owner: slot, .. } | Self::Deleted { owner: slot, .. } => {
                *slot = owner;
            }
        }
        self
    }

    /// Get the event ID.
    pub const fn event_id(&self) -> EventId {
        match self {
            Self::Applied { event_id, .. } | Self::Deleted { event_id, .. } => *event_id,
        }
    }

    /// Get the event type as a string.
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::Deleted { .. } => "deleted",
        }
    }

    /// Get the changed object.
    pub const fn object(&self) -> &ObjectRef {
        match self {
            Self::Applied { object, .. } | Self::Deleted { object, .. } => object,
        }
    }

    /// Get the kind of the changed object.
    pub fn kind(&self) -> &str {
        &self.object().kind
    }

    /// Get the owner of the changed object, if any.
    pub const fn owner(&self) -> Option<&OwnerRef> {
        match self {
            Self::Applied { owner, .. } | Self::Deleted { owner, .. } => owner.as_ref(),
        }
    }

    /// Get the serialized object.
    pub const fn body(&self) -> &serde_json::Value {
        match self {
            Self::Applied { body, .. } | Self::Deleted { body, .. } => body,
        }
    }

    /// Whether this event reports a removal.
    pub const fn is_deletion(&self) -> bool {
        matches!(self, Self::Deleted { .. })
    }
}
