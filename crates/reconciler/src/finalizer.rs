//! Finalization coordinator: explicit cleanup before an object may go.

use std::sync::Arc;

use itertools::Itertools;
use tracing::{info, warn};

use crate::children::LiveChild;
use crate::error::{ReconcileError, Result};
use crate::managed::Managed;
use crate::store::{ChildStore, ObjectStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Cleanup finished and the finalizer token was released.
    Done,
    /// A child could not be listed or deleted; the token stays.
    Retry { resource: String, reason: String },
}

/// Deletes the children an object claimed, then releases the token.
#[derive(Clone)]
pub struct FinalizationCoordinator {
    children: Arc<dyn ChildStore>,
}

impl FinalizationCoordinator {
    pub fn new(children: Arc<dyn ChildStore>) -> Self {
        Self { children }
    }

    /// Delete claimed children in reverse dependency order.
    ///
    /// Children that are already gone count as deleted.
    async fn delete_claimed(&self, claimed: Vec<LiveChild>) -> std::result::Result<(), (String, String)> {
        let ordered = claimed
            .into_iter()
            .map(|child| child.key)
            .sorted_by_key(|key| std::cmp::Reverse(key.kind.tier()));
        for key in ordered {
            match self.children.delete(&key).await {
                Ok(()) => info!(child = %key, "Deleted claimed child"),
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(child = %key, error = %e, "Failed to delete claimed child");
                    return Err((key.to_string(), e.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Run cleanup for an object marked for deletion.
    ///
    /// Every child claimed by the object's uid is deleted, whatever the
    /// current spec would render. The token is removed only after all of
    /// them are gone.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if releasing the token lost a write race, `Store`
    /// if the write failed otherwise.
    pub async fn finalize<O: Managed>(&self, object: &O, objects: &dyn ObjectStore<O>) -> Result<FinalizeOutcome> {
        let claimed = match self.children.list_claimed(&object.meta().uid).await {
            Ok(claimed) => claimed,
            Err(e) => {
                warn!(error = %e, "Failed to list claimed children");
                return Ok(FinalizeOutcome::Retry {
                    resource: format!("children claimed by {}", object.object_ref()),
                    reason: e.to_string(),
                });
            }
        };
        if let Err((resource, reason)) = self.delete_claimed(claimed).await {
            return Ok(FinalizeOutcome::Retry { resource, reason });
        }

        let mut released = object.clone();
        released.meta_mut().remove_finalizer(O::FINALIZER);
        objects
            .update(&released)
            .await
            .map_err(|e| ReconcileError::from_object("remove_finalizer", object.object_ref().to_string(), e))?;
        info!(kind = O::KIND, name = object.name(), "Finalizer removed");
        Ok(FinalizeOutcome::Done)
    }
}
