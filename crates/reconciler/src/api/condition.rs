//! Typed status conditions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known condition reasons.
pub mod reason {
    /// The object is being brought to its declared shape.
    pub const RECONCILING: &str = "Reconciling";
    /// A declared reference did not resolve.
    pub const INVALID_REFERENCE: &str = "InvalidReference";
    /// A child operation failed.
    pub const PROVISIONING_FAILED: &str = "ProvisioningFailed";
    /// Deletion cleanup is in progress or failed.
    pub const FINALIZING: &str = "Finalizing";
}

/// Condition types reported on every managed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionKind {
    Available,
    Degraded,
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "Available"),
            Self::Degraded => write!(f, "Degraded"),
        }
    }
}

/// Tri-state condition value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// A single observation about an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    /// Changes only when `status` changes.
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a condition stamped with the current time.
    pub fn new(
        kind: ConditionKind,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    fn same_observation(&self, other: &Self) -> bool {
        self.status == other.status && self.reason == other.reason && self.message == other.message
    }
}

/// Find the condition of a kind.
pub fn find_condition(conditions: &[Condition], kind: ConditionKind) -> Option<&Condition> {
    conditions.iter().find(|c| c.kind == kind)
}

/// Replace the condition of the same kind, keeping at most one per kind.
///
/// The transition time is carried over when the status did not change.
/// Returns whether anything observable changed.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) -> bool {
    match conditions.iter_mut().find(|c| c.kind == condition.kind) {
        Some(existing) if existing.same_observation(&condition) => false,
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
            *existing = condition;
            true
        }
        None => {
            conditions.push(condition);
            true
        }
    }
}
