//! Membership reconciler: removes per-member children of members that left.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::children::{ChildKey, ChildKind, LiveChild};
use crate::error::{ReconcileError, Result};
use crate::store::ChildStore;

/// Difference between declared members and members with live children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDelta {
    /// Declared but without live children yet.
    pub missing: BTreeSet<String>,
    /// Live children but no longer declared.
    pub orphaned: BTreeSet<String>,
}

impl MembershipDelta {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.orphaned.is_empty()
    }
}

/// Compute the symmetric difference between the declared set and the
/// members that own live children.
pub fn delta(declared: &BTreeSet<String>, live: &[LiveChild]) -> MembershipDelta {
    let present: BTreeSet<String> = live.iter().filter_map(LiveChild::member).map(ToString::to_string).collect();
    MembershipDelta {
        missing: declared.difference(&present).cloned().collect(),
        orphaned: present.difference(declared).cloned().collect(),
    }
}

/// Live children whose member is not declared.
pub fn orphans<'a>(declared: &BTreeSet<String>, live: &'a [LiveChild]) -> Vec<&'a LiveChild> {
    live.iter()
        .filter(|child| child.member().is_some_and(|member| !declared.contains(member)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipOutcome {
    InSync,
    Removed(ChildKey),
}

/// Deletes per-member children whose member is no longer declared.
///
/// Creation for newly declared members is left to the ensurer, which sees
/// them as ordinary missing descriptors.
#[derive(Clone)]
pub struct MembershipReconciler {
    children: Arc<dyn ChildStore>,
}

impl MembershipReconciler {
    pub fn new(children: Arc<dyn ChildStore>) -> Self {
        Self { children }
    }

    /// Remove at most one orphaned child.
    ///
    /// # Errors
    ///
    /// Returns `Provisioning` if listing or deleting fails.
    pub async fn reconcile(&self, owner_uid: &str, declared: &BTreeSet<String>) -> Result<MembershipOutcome> {
        for kind in ChildKind::PER_MEMBER {
            let live = self
                .children
                .list_owned(kind, owner_uid)
                .await
                .map_err(|e| ReconcileError::from_child(kind.as_str(), e))?;

            let changes = delta(declared, &live);
            if !changes.missing.is_empty() {
                debug!(%kind, missing = ?changes.missing, "Members without children");
            }

            for orphan in orphans(declared, &live) {
                info!(child = %orphan.key, member = orphan.member(), "Removing child of departed member");
                match self.children.delete(&orphan.key).await {
                    Ok(()) => return Ok(MembershipOutcome::Removed(orphan.key.clone())),
                    Err(e) if e.is_not_found() => continue,
                    Err(e) => return Err(ReconcileError::from_child(orphan.key.to_string(), e)),
                }
            }
        }
        Ok(MembershipOutcome::InSync)
    }
}
