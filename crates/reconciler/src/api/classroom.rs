//! The classroom kind: a teacher, enrolled students and their workloads.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{Condition, ObjectMeta};
use crate::children::render::render_classroom;
use crate::config::ReconcilerConfig;
use crate::error::{ReconcileError, ValidationError};
use crate::managed::Managed;
use crate::plan::Plan;
use crate::registry::{RegistryIndex, RegistryRecord, Role};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomSpec {
    /// Business id of the owning teacher.
    #[serde(default)]
    pub teacher: String,
    /// Business ids of the enrolled students.
    #[serde(default)]
    pub enrolled_students: Vec<String>,
    #[serde(default)]
    pub template_container: String,
    #[serde(default)]
    pub enable_exam_mode: bool,
    #[serde(default)]
    pub allow_user_root: bool,
    #[serde(default)]
    pub root_pass: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Members whose children were last converged.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classroom {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ClassroomSpec,
    #[serde(default)]
    pub status: ClassroomStatus,
}

/// Registry records a classroom's references resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassroomMembers {
    pub teacher: RegistryRecord,
    pub students: Vec<RegistryRecord>,
}

impl Classroom {
    pub fn new(name: impl Into<String>, teacher: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::new(name),
            spec: ClassroomSpec {
                teacher: teacher.into(),
                template_container: image.into(),
                ..ClassroomSpec::default()
            },
            status: ClassroomStatus::default(),
        }
    }

    #[must_use]
    pub fn with_students<I, S>(mut self, students: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.enrolled_students = students.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn exam_mode(mut self, enabled: bool) -> Self {
        self.spec.enable_exam_mode = enabled;
        self
    }

    /// Declared student ids, deduplicated.
    pub fn declared_students(&self) -> BTreeSet<String> {
        self.spec.enrolled_students.iter().cloned().collect()
    }
}

impl Managed for Classroom {
    const KIND: &'static str = "Classroom";
    const FINALIZER: &'static str = "classroom.kubelab.local/finalizer";
    const RELATED_KINDS: &'static [&'static str] = &["KubelabUser"];

    type Resolved = ClassroomMembers;

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

    fn validate(&self, registry: &RegistryIndex) -> Result<ClassroomMembers, ValidationError> {
        if self.spec.teacher.is_empty() {
            return Err(ValidationError::MissingOwner);
        }
        let teacher = registry
            .resolve(&self.spec.teacher)
            .ok_or_else(|| ValidationError::unknown_account(&self.spec.teacher))?;
        if teacher.role != Role::Privileged {
            return Err(ValidationError::not_a_teacher(&self.spec.teacher));
        }

        let students = self
            .declared_students()
            .into_iter()
            .map(|id| registry.resolve(&id).ok_or(ValidationError::UnknownAccount { id }))
            .collect::<Result<Vec<_>, _>>()?;

        if self.spec.template_container.trim().is_empty() {
            return Err(ValidationError::MissingImage);
        }

        Ok(ClassroomMembers { teacher, students })
    }

    fn render(&self, resolved: &ClassroomMembers, config: &ReconcilerConfig) -> Result<Plan, ReconcileError> {
        render_classroom(self, &resolved.students, &self.owner_ref(), config).map(Plan::new)
    }

    fn membership(&self) -> Option<BTreeSet<String>> {
        Some(self.declared_students())
    }

    fn project_summary(&mut self, plan: &Plan) -> bool {
        let members: Vec<String> = plan.members().into_iter().collect();
        if self.status.members == members {
            return false;
        }
        self.status.members = members;
        true
    }
}
