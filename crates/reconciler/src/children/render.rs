//! Pure rendering of accounts and classrooms into child descriptors.

use std::collections::BTreeMap;

use kubelab_events::OwnerRef;

use super::credentials::hash_secret;
use super::spec::{
    AccessMode, ChildSpec, NetworkPolicySpec, PolicyRule, ResourceLimits, RoleBindingSpec, RoleSpec, ServiceSpec,
    ServiceType, StorageClaimSpec, Volume, VolumeSource, WorkloadSpec,
};
use super::{ChildDescriptor, GROUP_LABEL, MEMBER_LABEL};
use crate::api::{Account, Classroom};
use crate::config::ReconcilerConfig;
use crate::error::Result;
use crate::registry::RegistryRecord;

pub const USER_ROLE: &str = "kubelab-user-role";
pub const USER_ROLE_BINDING: &str = "kubelab-user-rolebinding";
pub const HOME_MOUNT: &str = "home-mount";
pub const USER_CLAIM: &str = "user-data";
pub const CLASS_CLAIM: &str = "class-data";
pub const SSH_PORT: u16 = 22;

const STORAGE_PATH_ANNOTATION: &str = "nfs.io/storage-path";

/// Standard label set stamped on account children.
pub fn account_labels(id: &str) -> BTreeMap<String, String> {
    [
        ("app.kubernetes.io/name", "KubelabUser"),
        ("app.kubernetes.io/instance", id),
        ("app.kubernetes.io/version", "1"),
        ("app.kubernetes.io/part-of", "kubelabuser-operator"),
        ("app.kubernetes.io/created-by", "controller-manager"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Labels selecting one member's classroom workload.
pub fn member_labels(classroom: &str, member: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (GROUP_LABEL.to_string(), classroom.to_string()),
        (MEMBER_LABEL.to_string(), member.to_string()),
    ])
}

/// Children of an account, in dependency order.
///
/// The namespace carries no owner link, only a claim by the account.
pub fn render_account(account: &Account, owner: &OwnerRef, config: &ReconcilerConfig) -> Vec<ChildDescriptor> {
    let id = account.spec.id.as_str();
    let labels = account_labels(id);

    let namespace = ChildDescriptor::cluster(id, ChildSpec::Namespace)
        .claimed_by(owner.clone())
        .with_labels(labels.clone());

    let role = ChildDescriptor::namespaced(
        id,
        USER_ROLE,
        ChildSpec::Role(RoleSpec {
            rules: vec![
                PolicyRule::new("apps", "deployments", &["list", "scale"]),
                PolicyRule::new("", "pods", &["get"]),
            ],
        }),
    )
    .owned_by(owner.clone());

    let binding = ChildDescriptor::namespaced(
        id,
        USER_ROLE_BINDING,
        ChildSpec::RoleBinding(RoleBindingSpec {
            subject_kind: "Group".to_string(),
            subject_name: format!("{}{id}", config.group_prefix),
            role_name: USER_ROLE.to_string(),
        }),
    )
    .owned_by(owner.clone());

    let mount = ChildDescriptor::namespaced(
        id,
        HOME_MOUNT,
        ChildSpec::Workload(WorkloadSpec {
            image: config.mount_image.clone(),
            replicas: 1,
            selector: labels.clone(),
            env: BTreeMap::new(),
            ports: Vec::new(),
            volumes: vec![Volume {
                name: USER_CLAIM.to_string(),
                mount_path: "/srv".to_string(),
                source: VolumeSource::Claim {
                    claim_name: USER_CLAIM.to_string(),
                },
                read_only: false,
            }],
            limits: None,
            capabilities: Vec::new(),
            node_os: Some("linux".to_string()),
        }),
    )
    .owned_by(owner.clone())
    .with_labels(labels);

    let claim = ChildDescriptor::namespaced(
        id,
        USER_CLAIM,
        ChildSpec::StorageClaim(StorageClaimSpec {
            storage_class: config.storage_class.clone(),
            access_mode: AccessMode::ReadWriteMany,
            request: config.user_storage_request.clone(),
            annotations: BTreeMap::from([(STORAGE_PATH_ANNOTATION.to_string(), "user".to_string())]),
        }),
    )
    .owned_by(owner.clone());

    vec![namespace, role, binding, mount, claim]
}

/// Children of a classroom, in dependency order.
///
/// Every resolved member gets a workload, a service and a network isolation
/// rule; the rule is rendered absent unless exam mode is on.
///
/// # Errors
///
/// Returns `Provisioning` if a password cannot be hashed.
pub fn render_classroom(
    classroom: &Classroom,
    members: &[RegistryRecord],
    owner: &OwnerRef,
    config: &ReconcilerConfig,
) -> Result<Vec<ChildDescriptor>> {
    let name = classroom.metadata.name.as_str();
    let spec = &classroom.spec;
    let cost = config.password_hash_cost;
    let root_hash = hash_secret(&spec.root_pass, cost)?;

    let mut descriptors = vec![ChildDescriptor::cluster(name, ChildSpec::Namespace).claimed_by(owner.clone())];

    for member in members {
        let labels = member_labels(name, &member.business_id);

        let workload = WorkloadSpec {
            image: spec.template_container.clone(),
            replicas: 0,
            selector: labels.clone(),
            env: BTreeMap::from([
                ("ROOT_PASSWORD".to_string(), root_hash.clone()),
                ("SUDO_ACCESS".to_string(), spec.allow_user_root.to_string()),
                ("USER_NAME".to_string(), member.name.clone()),
                ("USER_PASSWORD".to_string(), hash_secret(&member.name, cost)?),
            ]),
            ports: vec![SSH_PORT],
            volumes: vec![
                Volume {
                    name: USER_CLAIM.to_string(),
                    mount_path: format!("/home/{}", member.name),
                    source: VolumeSource::Claim {
                        claim_name: USER_CLAIM.to_string(),
                    },
                    read_only: false,
                },
                Volume {
                    name: CLASS_CLAIM.to_string(),
                    mount_path: format!("/{name}"),
                    source: VolumeSource::Nfs {
                        server: config.nfs_server.clone(),
                        path: format!("{}/{name}", config.class_data_root.trim_end_matches('/')),
                    },
                    read_only: true,
                },
            ],
            limits: Some(ResourceLimits {
                cpu: "100m".to_string(),
                memory: "256Mi".to_string(),
                ephemeral_storage: "1Gi".to_string(),
            }),
            capabilities: vec!["SYS_CHROOT".to_string(), "AUDIT_WRITE".to_string(), "NET_RAW".to_string()],
            node_os: Some("linux".to_string()),
        };
        descriptors.push(
            ChildDescriptor::namespaced(&member.business_id, name, ChildSpec::Workload(workload))
                .owned_by(owner.clone())
                .with_labels(labels.clone()),
        );

        descriptors.push(
            ChildDescriptor::namespaced(
                &member.business_id,
                name,
                ChildSpec::Service(ServiceSpec {
                    service_type: ServiceType::NodePort,
                    selector: labels.clone(),
                    port: SSH_PORT,
                    node_port: None,
                }),
            )
            .owned_by(owner.clone())
            .with_labels(labels.clone()),
        );

        let isolation = ChildDescriptor::namespaced(
            &member.business_id,
            name,
            ChildSpec::NetworkPolicy(NetworkPolicySpec {
                pod_selector: labels.clone(),
                ingress_tcp_ports: vec![SSH_PORT],
                allow_egress: false,
            }),
        )
        .owned_by(owner.clone())
        .with_labels(labels);
        descriptors.push(if spec.enable_exam_mode { isolation } else { isolation.absent() });
    }

    descriptors.push(
        ChildDescriptor::namespaced(
            name,
            CLASS_CLAIM,
            ChildSpec::StorageClaim(StorageClaimSpec {
                storage_class: config.storage_class.clone(),
                access_mode: AccessMode::ReadOnlyMany,
                request: config.class_storage_request.clone(),
                annotations: BTreeMap::from([(STORAGE_PATH_ANNOTATION.to_string(), "class".to_string())]),
            }),
        )
        .owned_by(owner.clone()),
    );

    Ok(descriptors)
}
