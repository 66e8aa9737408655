//! Desired specifications for each child resource kind.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ChildKind;

/// Access rule granted by a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
    pub verbs: Vec<String>,
}

impl PolicyRule {
    pub fn new(api_group: &str, resource: &str, verbs: &[&str]) -> Self {
        Self {
            api_groups: vec![api_group.to_string()],
            resources: vec![resource.to_string()],
            verbs: verbs.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub rules: Vec<PolicyRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBindingSpec {
    pub subject_kind: String,
    pub subject_name: String,
    pub role_name: String,
}

/// Where a volume's data comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum VolumeSource {
    Claim { claim_name: String },
    Nfs { server: String, path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    pub mount_path: String,
    pub source: VolumeSource,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimits {
    pub cpu: String,
    pub memory: String,
    pub ephemeral_storage: String,
}

/// A replicated container deployment.
///
/// Only `image` is compared against the live object; `replicas` belongs to
/// whoever scales the workload after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    pub image: String,
    pub replicas: u32,
    pub selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceLimits>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_os: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    ClusterIp,
    NodePort,
}

/// A network endpoint in front of a workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    pub service_type: ServiceType,
    pub selector: BTreeMap<String, String>,
    pub port: u16,
    /// Assigned by the platform on create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_port: Option<u16>,
}

/// Restricts traffic to and from the selected workloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicySpec {
    pub pod_selector: BTreeMap<String, String>,
    /// TCP ports accepted on ingress; everything else is denied.
    pub ingress_tcp_ports: Vec<u16>,
    pub allow_egress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    ReadWriteMany,
    ReadOnlyMany,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageClaimSpec {
    pub storage_class: String,
    pub access_mode: AccessMode,
    pub request: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Desired spec of a child, one variant per kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "spec")]
pub enum ChildSpec {
    Namespace,
    Role(RoleSpec),
    RoleBinding(RoleBindingSpec),
    Workload(WorkloadSpec),
    Service(ServiceSpec),
    NetworkPolicy(NetworkPolicySpec),
    StorageClaim(StorageClaimSpec),
}

impl ChildSpec {
    /// The kind this spec describes.
    pub const fn kind(&self) -> ChildKind {
        match self {
            Self::Namespace => ChildKind::Namespace,
            Self::Role(_) => ChildKind::Role,
            Self::RoleBinding(_) => ChildKind::RoleBinding,
            Self::Workload(_) => ChildKind::Workload,
            Self::Service(_) => ChildKind::Service,
            Self::NetworkPolicy(_) => ChildKind::NetworkPolicy,
            Self::StorageClaim(_) => ChildKind::StorageClaim,
        }
    }

    /// Workload spec, if this is a workload.
    pub const fn as_workload(&self) -> Option<&WorkloadSpec> {
        match self {
            Self::Workload(spec) => Some(spec),
            _ => None,
        }
    }

    /// Service spec, if this is a service.
    pub const fn as_service(&self) -> Option<&ServiceSpec> {
        match self {
            Self::Service(spec) => Some(spec),
            _ => None,
        }
    }
}
