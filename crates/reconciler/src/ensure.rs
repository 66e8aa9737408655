//! Resource ensurer: get-or-create (or get-and-delete) for a single child,
//! plus release of claimed children a plan stopped rendering.

use std::sync::Arc;

use tracing::{debug, info};

use crate::children::{ChildDescriptor, ChildKey, LiveChild, Presence};
use crate::error::{ReconcileError, Result};
use crate::plan::Plan;
use crate::store::ChildStore;

/// What `ensure` did for one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The child was missing and has been created.
    Created(LiveChild),
    /// The child must not exist and has been deleted.
    Deleted,
    /// The child exists; nothing was written.
    Exists(LiveChild),
    /// The child must not exist and already does not.
    Absent,
}

impl EnsureOutcome {
    /// Whether the store was written.
    pub const fn mutated(&self) -> bool {
        matches!(self, Self::Created(_) | Self::Deleted)
    }
}

/// What `release_stale` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// A claimed child the plan no longer renders was deleted.
    Released(ChildKey),
    /// Every claimed child is still wanted.
    InSync,
}

/// Makes a child's existence match its descriptor.
///
/// Existing children are never rewritten here; comparing mutable fields is
/// the drift corrector's job.
#[derive(Clone)]
pub struct ResourceEnsurer {
    children: Arc<dyn ChildStore>,
}

impl ResourceEnsurer {
    pub fn new(children: Arc<dyn ChildStore>) -> Self {
        Self { children }
    }

    /// Ensure one descriptor.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when a concurrent writer created the child first,
    /// `Provisioning` for any other store failure.
    pub async fn ensure(&self, descriptor: &ChildDescriptor) -> Result<EnsureOutcome> {
        let key = &descriptor.key;
        let live = self
            .children
            .get(key)
            .await
            .map_err(|e| ReconcileError::from_child(key.to_string(), e))?;

        match (descriptor.presence, live) {
            (Presence::Present, Some(live)) => {
                debug!(child = %key, "Child exists");
                Ok(EnsureOutcome::Exists(live))
            }
            (Presence::Present, None) => {
                info!(child = %key, "Creating child resource");
                let created = self
                    .children
                    .create(descriptor)
                    .await
                    .map_err(|e| ReconcileError::from_child(key.to_string(), e))?;
                Ok(EnsureOutcome::Created(created))
            }
            (Presence::Absent, Some(_)) => {
                info!(child = %key, "Deleting child resource that is no longer wanted");
                match self.children.delete(key).await {
                    Ok(()) => Ok(EnsureOutcome::Deleted),
                    Err(e) if e.is_not_found() => Ok(EnsureOutcome::Absent),
                    Err(e) => Err(ReconcileError::from_child(key.to_string(), e)),
                }
            }
            (Presence::Absent, None) => Ok(EnsureOutcome::Absent),
        }
    }

    /// Delete the first child claimed by `claimant_uid` that `plan` does
    /// not render as present.
    ///
    /// Covers claimed children whose key was derived from a spec field
    /// that has since changed.
    ///
    /// # Errors
    ///
    /// Returns `Provisioning` if listing or deleting fails.
    pub async fn release_stale(&self, claimant_uid: &str, plan: &Plan) -> Result<ReleaseOutcome> {
        let wanted = plan.claimed();
        let claimed = self
            .children
            .list_claimed(claimant_uid)
            .await
            .map_err(|e| ReconcileError::from_child(format!("children claimed by {claimant_uid}"), e))?;

        for stale in claimed.iter().filter(|child| !wanted.contains(&child.key)) {
            let key = &stale.key;
            info!(child = %key, "Releasing claimed child the plan no longer renders");
            match self.children.delete(key).await {
                Ok(()) => return Ok(ReleaseOutcome::Released(key.clone())),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(ReconcileError::from_child(key.to_string(), e)),
            }
        }
        Ok(ReleaseOutcome::InSync)
    }
}
