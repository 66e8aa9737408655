//! The seam between the generic reconcile loop and a concrete kind.

use std::collections::BTreeSet;
use std::fmt::Debug;

use kubelab_events::{ObjectRef, OwnerRef};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::api::{Condition, ObjectMeta};
use crate::config::ReconcilerConfig;
use crate::error::{ReconcileError, ValidationError};
use crate::plan::Plan;
use crate::registry::RegistryIndex;

/// A desired-state object the engine converges.
///
/// Implementations stay pure: validation reads the registry index and
/// rendering builds descriptors, neither performs I/O.
///
/// Children without an owner link must be claimed by the object (see
/// `ChildDescriptor::claimed_by`) so cleanup can find them later.
pub trait Managed: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Kind name used in watch events and logs.
    const KIND: &'static str;

    /// Finalizer token guarding explicit cleanup.
    const FINALIZER: &'static str;

    /// Kinds whose changes can flip this kind's validation outcome.
    const RELATED_KINDS: &'static [&'static str] = &[];

    /// What validation resolved the declared references to.
    type Resolved: Send + Sync;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn conditions(&self) -> &[Condition];

    fn conditions_mut(&mut self) -> &mut Vec<Condition>;

    /// Resolve and check declared references.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` naming the first reference that fails.
    fn validate(&self, registry: &RegistryIndex) -> Result<Self::Resolved, ValidationError>;

    /// Render the children this object should converge to.
    ///
    /// # Errors
    ///
    /// Returns `Provisioning` when a rendered value cannot be produced.
    fn render(&self, resolved: &Self::Resolved, config: &ReconcilerConfig) -> Result<Plan, ReconcileError>;

    /// Declared member ids, for kinds with per-member children.
    fn membership(&self) -> Option<BTreeSet<String>> {
        None
    }

    /// Copy converged facts into status. Returns whether status changed.
    fn project_summary(&mut self, _plan: &Plan) -> bool {
        false
    }

    fn name(&self) -> &str {
        &self.meta().name
    }

    fn owner_ref(&self) -> OwnerRef {
        let meta = self.meta();
        OwnerRef::new(Self::KIND, &meta.name, &meta.uid)
    }

    fn object_ref(&self) -> ObjectRef {
        ObjectRef::cluster(Self::KIND, &self.meta().name)
    }
}
