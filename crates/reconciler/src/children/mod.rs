//! Child resources: descriptors of desired state and their live counterparts.

pub mod credentials;
pub mod render;
pub mod spec;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use kubelab_events::{ObjectRef, OwnerRef};
use serde::{Deserialize, Serialize};

pub use spec::ChildSpec;

/// Label carrying the business id of the member a per-member child belongs to.
pub const MEMBER_LABEL: &str = "student";

/// Label carrying the name of the group a per-member child belongs to.
pub const GROUP_LABEL: &str = "class";

/// Kinds of child resources the engine manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChildKind {
    Namespace,
    Role,
    RoleBinding,
    Workload,
    Service,
    NetworkPolicy,
    StorageClaim,
}

impl ChildKind {
    pub const ALL: [Self; 7] = [
        Self::Namespace,
        Self::Role,
        Self::RoleBinding,
        Self::Workload,
        Self::Service,
        Self::NetworkPolicy,
        Self::StorageClaim,
    ];

    /// Kinds created once per group member.
    pub const PER_MEMBER: [Self; 3] = [Self::Workload, Self::Service, Self::NetworkPolicy];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Namespace => "Namespace",
            Self::Role => "Role",
            Self::RoleBinding => "RoleBinding",
            Self::Workload => "Workload",
            Self::Service => "Service",
            Self::NetworkPolicy => "NetworkPolicy",
            Self::StorageClaim => "StorageClaim",
        }
    }

    /// Dependency tier: lower tiers are created first and deleted last.
    pub const fn tier(self) -> u8 {
        match self {
            Self::Namespace => 0,
            Self::Role | Self::RoleBinding => 1,
            Self::Workload => 2,
            Self::Service => 3,
            Self::NetworkPolicy => 4,
            Self::StorageClaim => 5,
        }
    }

    /// Fields compared against live objects after creation.
    pub const fn mutable_fields(self) -> &'static [&'static str] {
        match self {
            Self::Workload => &["image"],
            _ => &[],
        }
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of a child resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChildKey {
    pub kind: ChildKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl ChildKey {
    pub fn cluster(kind: ChildKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.into(),
        }
    }

    pub fn namespaced(kind: ChildKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// The watch-event reference for this child.
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            kind: self.kind.as_str().to_string(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for ChildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Whether a descriptor asks for the child to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Presence {
    Present,
    Absent,
}

/// Pure description of one child a managed object should converge to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildDescriptor {
    pub key: ChildKey,
    /// Garbage-collection link: the child goes when the owner goes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerRef>,
    /// Object that created an unowned child and must delete it explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<OwnerRef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    pub spec: ChildSpec,
    pub presence: Presence,
}

impl ChildDescriptor {
    /// Describe a cluster-scoped child.
    pub fn cluster(name: impl Into<String>, spec: ChildSpec) -> Self {
        Self {
            key: ChildKey::cluster(spec.kind(), name),
            owner: None,
            claimed_by: None,
            labels: BTreeMap::new(),
            spec,
            presence: Presence::Present,
        }
    }

    /// Describe a namespaced child.
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>, spec: ChildSpec) -> Self {
        Self {
            key: ChildKey::namespaced(spec.kind(), namespace, name),
            owner: None,
            claimed_by: None,
            labels: BTreeMap::new(),
            spec,
            presence: Presence::Present,
        }
    }

    #[must_use]
    pub fn owned_by(mut self, owner: OwnerRef) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Record `claimant` as responsible for deleting this unowned child.
    #[must_use]
    pub fn claimed_by(mut self, claimant: OwnerRef) -> Self {
        self.claimed_by = Some(claimant);
        self
    }

    #[must_use]
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels.extend(labels);
        self
    }

    /// Mark the child as one that must not exist.
    #[must_use]
    pub const fn absent(mut self) -> Self {
        self.presence = Presence::Absent;
        self
    }

    pub const fn kind(&self) -> ChildKind {
        self.key.kind
    }

    pub fn is_present(&self) -> bool {
        self.presence == Presence::Present
    }

    /// Member id for per-member children.
    pub fn member(&self) -> Option<&str> {
        self.labels.get(MEMBER_LABEL).map(String::as_str)
    }
}

/// A child as it exists in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChild {
    pub key: ChildKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<OwnerRef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    pub spec: ChildSpec,
    pub uid: String,
    pub resource_version: u64,
    pub created_at: DateTime<Utc>,
}

impl LiveChild {
    /// Materialize a descriptor as a stored child.
    pub fn from_descriptor(descriptor: &ChildDescriptor, uid: impl Into<String>, resource_version: u64) -> Self {
        Self {
            key: descriptor.key.clone(),
            owner: descriptor.owner.clone(),
            claimed_by: descriptor.claimed_by.clone(),
            labels: descriptor.labels.clone(),
            spec: descriptor.spec.clone(),
            uid: uid.into(),
            resource_version,
            created_at: Utc::now(),
        }
    }

    pub fn member(&self) -> Option<&str> {
        self.labels.get(MEMBER_LABEL).map(String::as_str)
    }

    pub fn is_owned_by(&self, owner_uid: &str) -> bool {
        self.owner.as_ref().is_some_and(|o| o.uid == owner_uid)
    }

    pub fn is_claimed_by(&self, claimant_uid: &str) -> bool {
        self.claimed_by.as_ref().is_some_and(|c| c.uid == claimant_uid)
    }
}
