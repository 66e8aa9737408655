//! The account kind: one person and their personal namespace.

use serde::{Deserialize, Serialize};

use super::{Condition, ObjectMeta};
use crate::children::render::{HOME_MOUNT, render_account};
use crate::config::ReconcilerConfig;
use crate::error::{ReconcileError, ValidationError};
use crate::managed::Managed;
use crate::plan::Plan;
use crate::registry::RegistryIndex;

const MAX_LABEL_LEN: usize = 63;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSpec {
    /// Business identifier (student or teacher id); names the account namespace.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub is_teacher: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Name of the home-mount workload once provisioned.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mount_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: AccountSpec,
    #[serde(default)]
    pub status: AccountStatus,
}

impl Account {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::new(name),
            spec: AccountSpec {
                id: id.into(),
                is_teacher: false,
            },
            status: AccountStatus::default(),
        }
    }

    #[must_use]
    pub const fn teacher(mut self) -> Self {
        self.spec.is_teacher = true;
        self
    }
}

/// Check that `id` can name a namespace.
fn check_dns_label(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::invalid_identifier(id, "id is empty"));
    }
    if id.len() > MAX_LABEL_LEN {
        return Err(ValidationError::invalid_identifier(
            id,
            format!("longer than {MAX_LABEL_LEN} characters"),
        ));
    }
    if !id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err(ValidationError::invalid_identifier(
            id,
            "only lowercase letters, digits and '-' are allowed",
        ));
    }
    if id.starts_with('-') || id.ends_with('-') {
        return Err(ValidationError::invalid_identifier(id, "must start and end with a letter or digit"));
    }
    Ok(())
}

impl Managed for Account {
    const KIND: &'static str = "KubelabUser";
    const FINALIZER: &'static str = "kubeuser.kubelab.local/finalizer";

    type Resolved = ();

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn conditions(&self) -> &[Condition] {
        &self.status.conditions
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.status.conditions
    }

    fn validate(&self, registry: &RegistryIndex) -> Result<(), ValidationError> {
        check_dns_label(&self.spec.id)?;
        match registry.resolve(&self.spec.id) {
            Some(record) if record.name != self.metadata.name => Err(ValidationError::DuplicateIdentifier {
                id: self.spec.id.clone(),
                claimed_by: record.name,
            }),
            _ => Ok(()),
        }
    }

    fn render(&self, _resolved: &(), config: &ReconcilerConfig) -> Result<Plan, ReconcileError> {
        Ok(Plan::new(render_account(self, &self.owner_ref(), config)))
    }

    fn project_summary(&mut self, _plan: &Plan) -> bool {
        if self.status.mount_name == HOME_MOUNT {
            return false;
        }
        self.status.mount_name = HOME_MOUNT.to_string();
        true
    }
}
