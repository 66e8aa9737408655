//! Status projector: maps pass outcomes to conditions.

use crate::api::{Condition, ConditionKind, ConditionStatus, find_condition, reason, set_condition};
use crate::managed::Managed;

/// Outcome of a pass, as reported to readers of the object's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// First observation, nothing done yet.
    Initializing,
    /// A declared reference did not resolve.
    InvalidReference(String),
    /// A child operation failed.
    ProvisioningFailed(String),
    /// Deletion cleanup started.
    Finalizing,
    /// Deletion cleanup failed.
    FinalizeFailed(String),
    /// Every child exists and matches, clearing an earlier failure.
    Recovered,
    /// Every child exists and matches.
    Converged,
}

/// Build the single condition a pass outcome reports.
pub fn condition_for(kind: &str, name: &str, outcome: &PassOutcome) -> Condition {
    match outcome {
        PassOutcome::Initializing => Condition::new(
            ConditionKind::Available,
            ConditionStatus::Unknown,
            reason::RECONCILING,
            "Starting reconciliation",
        ),
        PassOutcome::InvalidReference(message) => Condition::new(
            ConditionKind::Available,
            ConditionStatus::False,
            reason::INVALID_REFERENCE,
            message.clone(),
        ),
        PassOutcome::ProvisioningFailed(message) => Condition::new(
            ConditionKind::Degraded,
            ConditionStatus::True,
            reason::PROVISIONING_FAILED,
            message.clone(),
        ),
        PassOutcome::Finalizing => Condition::new(
            ConditionKind::Degraded,
            ConditionStatus::Unknown,
            reason::FINALIZING,
            format!("Performing finalizer operations for {kind} {name}"),
        ),
        PassOutcome::FinalizeFailed(message) => Condition::new(
            ConditionKind::Degraded,
            ConditionStatus::True,
            reason::FINALIZING,
            message.clone(),
        ),
        PassOutcome::Recovered => Condition::new(
            ConditionKind::Degraded,
            ConditionStatus::False,
            reason::RECONCILING,
            format!("{kind} {name} recovered from an earlier failure"),
        ),
        PassOutcome::Converged => Condition::new(
            ConditionKind::Available,
            ConditionStatus::True,
            reason::RECONCILING,
            format!("All child resources for {kind} {name} are provisioned"),
        ),
    }
}

/// Apply a pass outcome to an object's conditions.
///
/// Returns whether the conditions changed, so callers can skip no-op writes.
pub fn project<O: Managed>(object: &mut O, outcome: &PassOutcome) -> bool {
    let condition = condition_for(O::KIND, object.name(), outcome);
    set_condition(object.conditions_mut(), condition)
}

/// Whether the object still reports a failure.
pub fn is_degraded<O: Managed>(object: &O) -> bool {
    find_condition(object.conditions(), ConditionKind::Degraded).is_some_and(|c| c.status == ConditionStatus::True)
}

/// Whether finalization has already been announced on the object.
pub fn finalization_announced<O: Managed>(object: &O) -> bool {
    find_condition(object.conditions(), ConditionKind::Degraded).is_some_and(|c| c.reason == reason::FINALIZING)
}
