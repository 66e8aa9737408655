//! Drift corrector: realigns the mutable fields of existing children.

use std::sync::Arc;

use tracing::info;

use crate::children::{ChildDescriptor, ChildSpec, LiveChild};
use crate::error::{ReconcileError, Result};
use crate::store::ChildStore;

/// A mutable field whose live value differs from the desired one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    pub field: &'static str,
    pub desired: String,
    pub live: String,
}

/// Read a mutable field off a spec.
fn field(spec: &ChildSpec, name: &str) -> Option<String> {
    match (spec, name) {
        (ChildSpec::Workload(workload), "image") => Some(workload.image.clone()),
        _ => None,
    }
}

fn set_field(spec: &mut ChildSpec, name: &str, value: &str) {
    if let (ChildSpec::Workload(workload), "image") = (spec, name) {
        value.clone_into(&mut workload.image);
    }
}

/// Compare only the kind's mutable fields.
///
/// Everything else (replica counts, assigned ports) belongs to other
/// writers once the child exists and is never reported.
pub fn detect(desired: &ChildDescriptor, live: &LiveChild) -> Option<Drift> {
    desired.kind().mutable_fields().iter().find_map(|&name| {
        let want = field(&desired.spec, name)?;
        let have = field(&live.spec, name)?;
        (want != have).then_some(Drift {
            field: name,
            desired: want,
            live: have,
        })
    })
}

/// Copy the desired mutable fields onto a live child.
fn realign(desired: &ChildDescriptor, live: &LiveChild) -> LiveChild {
    let mut patched = live.clone();
    for &name in desired.kind().mutable_fields() {
        if let Some(value) = field(&desired.spec, name) {
            set_field(&mut patched.spec, name, &value);
        }
    }
    patched
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftOutcome {
    InSync,
    Corrected(Drift),
}

/// Writes back children whose mutable fields drifted.
#[derive(Clone)]
pub struct DriftCorrector {
    children: Arc<dyn ChildStore>,
}

impl DriftCorrector {
    pub fn new(children: Arc<dyn ChildStore>) -> Self {
        Self { children }
    }

    /// Correct a single child.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the child changed since it was read,
    /// `Provisioning` if the update failed otherwise.
    pub async fn correct(&self, desired: &ChildDescriptor, live: &LiveChild) -> Result<DriftOutcome> {
        let Some(drift) = detect(desired, live) else {
            return Ok(DriftOutcome::InSync);
        };
        info!(
            child = %live.key,
            field = drift.field,
            desired = %drift.desired,
            live = %drift.live,
            "Correcting drifted child"
        );
        self.children
            .update(&realign(desired, live))
            .await
            .map_err(|e| ReconcileError::from_child(live.key.to_string(), e))?;
        Ok(DriftOutcome::Corrected(drift))
    }
}
