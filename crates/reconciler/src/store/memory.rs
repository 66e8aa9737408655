//! In-memory platform: objects, children, ownership and watch events.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use kubelab_events::{EventBus, WatchEvent};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use ulid::Ulid;

use super::{ChildStore, ObjectStore};
use crate::children::spec::ServiceType;
use crate::children::{ChildDescriptor, ChildKey, ChildKind, ChildSpec, LiveChild};
use crate::error::{StoreError, StoreResult};
use crate::managed::Managed;

const NODE_PORT_BASE: u16 = 30000;
const NODE_PORT_RANGE: u16 = 2768;

/// Fault target for `list_claimed`, which spans every child kind.
pub const CLAIMED_TARGET: &str = "claimed";

/// Store operations that faults can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    List,
    Create,
    Update,
    UpdateStatus,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "get",
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::UpdateStatus => "update_status",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A failure the store returns instead of performing an operation.
#[derive(Debug, Clone)]
pub struct Fault {
    operation: Operation,
    /// Object kind or child kind name.
    target: String,
    error: StoreError,
    remaining: Option<u32>,
}

impl Fault {
    /// Fail every matching operation until cleared.
    pub fn new(operation: Operation, target: impl Into<String>, error: StoreError) -> Self {
        Self {
            operation,
            target: target.into(),
            error,
            remaining: None,
        }
    }

    /// Backend failure for a child kind.
    pub fn child(operation: Operation, kind: ChildKind, reason: impl Into<String>) -> Self {
        Self::new(operation, kind.as_str(), StoreError::backend(operation.to_string(), reason))
    }

    /// A single optimistic-concurrency conflict.
    pub fn conflict(operation: Operation, target: impl Into<String>) -> Self {
        let target = target.into();
        Self::new(
            operation,
            target.clone(),
            StoreError::conflict(target, "the object has been modified"),
        )
        .times(1)
    }

    /// Only fail the next `n` matching operations.
    #[must_use]
    pub const fn times(mut self, n: u32) -> Self {
        self.remaining = Some(n);
        self
    }

    fn matches(&self, operation: Operation, target: &str) -> bool {
        self.operation == operation && self.target == target
    }
}

#[derive(Debug, Default)]
struct State {
    /// Serialized managed objects keyed by (kind, name).
    objects: BTreeMap<(String, String), Value>,
    children: BTreeMap<ChildKey, LiveChild>,
    /// Owner uid to the keys of its children.
    owned: HashMap<String, BTreeSet<ChildKey>>,
    /// Claimant uid to the keys of the unowned children it must delete.
    claimed: HashMap<String, BTreeSet<ChildKey>>,
}

fn index(map: &mut HashMap<String, BTreeSet<ChildKey>>, uid: &str, key: &ChildKey) {
    map.entry(uid.to_string()).or_default().insert(key.clone());
}

fn unindex(map: &mut HashMap<String, BTreeSet<ChildKey>>, uid: &str, key: &ChildKey) {
    if let Some(keys) = map.get_mut(uid) {
        keys.remove(key);
        if keys.is_empty() {
            map.remove(uid);
        }
    }
}

impl State {
    fn insert_child(&mut self, child: LiveChild) {
        if let Some(owner) = &child.owner {
            index(&mut self.owned, &owner.uid, &child.key);
        }
        if let Some(claimant) = &child.claimed_by {
            index(&mut self.claimed, &claimant.uid, &child.key);
        }
        self.children.insert(child.key.clone(), child);
    }

    fn remove_child(&mut self, key: &ChildKey, events: &mut Vec<WatchEvent>) -> Option<LiveChild> {
        let child = self.children.remove(key)?;
        if let Some(owner) = &child.owner {
            unindex(&mut self.owned, &owner.uid, key);
        }
        if let Some(claimant) = &child.claimed_by {
            unindex(&mut self.claimed, &claimant.uid, key);
        }
        events.push(child_event(&child, true));

        if key.kind == ChildKind::Namespace {
            let contents: Vec<ChildKey> = self
                .children
                .keys()
                .filter(|k| k.namespace.as_deref() == Some(key.name.as_str()))
                .cloned()
                .collect();
            for inner in contents {
                self.remove_child(&inner, events);
            }
        }
        Some(child)
    }

    /// Remove everything owned by `owner_uid`.
    fn collect_garbage(&mut self, owner_uid: &str, events: &mut Vec<WatchEvent>) {
        let Some(keys) = self.owned.remove(owner_uid) else {
            return;
        };
        for key in keys {
            self.remove_child(&key, events);
        }
    }

    fn namespace_exists(&self, name: &str) -> bool {
        self.children.contains_key(&ChildKey::cluster(ChildKind::Namespace, name))
    }
}

fn child_event(child: &LiveChild, deleted: bool) -> WatchEvent {
    let body = serde_json::to_value(child).unwrap_or_default();
    let object = child.key.object_ref();
    let event = if deleted {
        WatchEvent::deleted(object, body)
    } else {
        WatchEvent::applied(object, body)
    };
    event.with_owner(child.owner.clone())
}

fn object_label<O: Managed>(name: &str) -> String {
    format!("{}/{name}", O::KIND)
}

fn replace_status(body: &mut Value, status: Option<Value>) {
    if let Some(map) = body.as_object_mut() {
        match status {
            Some(status) => {
                map.insert("status".to_string(), status);
            }
            None => {
                map.remove("status");
            }
        }
    }
}

/// Platform stand-in holding managed objects and their children in memory.
///
/// Implements the pieces of platform behavior the engine relies on:
/// version-checked writes, deletion marking while finalizers remain,
/// owner-based garbage collection, namespace scoping and node-port
/// assignment. Every change is published to the event bus when one is
/// attached.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
    faults: Mutex<Vec<Fault>>,
    revision: AtomicU64,
    node_ports: AtomicU16,
    bus: Option<Arc<EventBus>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish watch events for every change to `bus`.
    pub fn with_bus(bus: Arc<EventBus>) -> Self {
        Self {
            bus: Some(bus),
            ..Self::default()
        }
    }

    pub async fn inject_fault(&self, fault: Fault) {
        self.faults.lock().await.push(fault);
    }

    pub async fn clear_faults(&self) {
        self.faults.lock().await.clear();
    }

    /// Every stored child, ordered by key.
    pub async fn children(&self) -> Vec<LiveChild> {
        self.state.read().await.children.values().cloned().collect()
    }

    pub async fn child_count(&self) -> usize {
        self.state.read().await.children.len()
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::Relaxed).saturating_add(1)
    }

    fn next_node_port(&self) -> u16 {
        let offset = self
            .node_ports
            .fetch_add(1, Ordering::Relaxed)
            .checked_rem(NODE_PORT_RANGE)
            .unwrap_or_default();
        NODE_PORT_BASE.saturating_add(offset)
    }

    async fn check_fault(&self, operation: Operation, target: &str) -> StoreResult<()> {
        let mut faults = self.faults.lock().await;
        let Some(pos) = faults.iter().position(|f| f.matches(operation, target)) else {
            return Ok(());
        };
        let Some(fault) = faults.get_mut(pos) else {
            return Ok(());
        };
        let error = fault.error.clone();
        if let Some(remaining) = fault.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                faults.remove(pos);
            }
        }
        debug!(%operation, target, error = %error, "Injected fault");
        Err(error)
    }

    async fn publish(&self, events: Vec<WatchEvent>) {
        let Some(bus) = &self.bus else {
            return;
        };
        for event in events {
            if let Err(e) = bus.publish(event).await {
                warn!(error = %e, "Failed to publish watch event");
            }
        }
    }

    fn decode<O: Managed>(value: &Value) -> StoreResult<O> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

#[async_trait]
impl<O: Managed> ObjectStore<O> for InMemoryStore {
    async fn get(&self, name: &str) -> StoreResult<Option<O>> {
        self.check_fault(Operation::Get, O::KIND).await?;
        let state = self.state.read().await;
        state
            .objects
            .get(&(O::KIND.to_string(), name.to_string()))
            .map(Self::decode)
            .transpose()
    }

    async fn list(&self) -> StoreResult<Vec<O>> {
        self.check_fault(Operation::List, O::KIND).await?;
        let state = self.state.read().await;
        state
            .objects
            .iter()
            .filter(|((kind, _), _)| kind == O::KIND)
            .map(|(_, value)| Self::decode(value))
            .collect()
    }

    async fn create(&self, mut object: O) -> StoreResult<O> {
        self.check_fault(Operation::Create, O::KIND).await?;
        let slot = (O::KIND.to_string(), object.name().to_string());

        let mut state = self.state.write().await;
        if state.objects.contains_key(&slot) {
            return Err(StoreError::already_exists(object_label::<O>(&slot.1)));
        }
        let meta = object.meta_mut();
        meta.uid = Ulid::new().to_string();
        meta.resource_version = self.next_revision();
        meta.deletion_timestamp = None;

        let body = serde_json::to_value(&object)?;
        state.objects.insert(slot, body.clone());
        drop(state);

        self.publish(vec![WatchEvent::applied(object.object_ref(), body)]).await;
        Ok(object)
    }

    async fn update(&self, object: &O) -> StoreResult<O> {
        self.check_fault(Operation::Update, O::KIND).await?;
        let slot = (O::KIND.to_string(), object.name().to_string());
        let label = object_label::<O>(&slot.1);

        let mut state = self.state.write().await;
        let stored_value = state
            .objects
            .get(&slot)
            .cloned()
            .ok_or_else(|| StoreError::not_found(&label))?;
        let stored: O = Self::decode(&stored_value)?;
        if stored.meta().resource_version != object.meta().resource_version {
            return Err(StoreError::conflict(label, "resource version is stale"));
        }

        let mut next = object.clone();
        let meta = next.meta_mut();
        meta.uid.clone_from(&stored.meta().uid);
        meta.deletion_timestamp = stored.meta().deletion_timestamp;
        meta.resource_version = self.next_revision();

        let mut body = serde_json::to_value(&next)?;
        replace_status(&mut body, stored_value.get("status").cloned());
        let next: O = Self::decode(&body)?;

        let mut events = Vec::new();
        if next.meta().is_being_deleted() && next.meta().finalizers.is_empty() {
            state.objects.remove(&slot);
            events.push(WatchEvent::deleted(next.object_ref(), body));
            state.collect_garbage(&next.meta().uid, &mut events);
            debug!(object = %label, "Last finalizer removed, object deleted");
        } else {
            state.objects.insert(slot, body.clone());
            events.push(WatchEvent::applied(next.object_ref(), body));
        }
        drop(state);

        self.publish(events).await;
        Ok(next)
    }

    async fn update_status(&self, object: &O) -> StoreResult<O> {
        self.check_fault(Operation::UpdateStatus, O::KIND).await?;
        let slot = (O::KIND.to_string(), object.name().to_string());
        let label = object_label::<O>(&slot.1);

        let mut state = self.state.write().await;
        let mut body = state
            .objects
            .get(&slot)
            .cloned()
            .ok_or_else(|| StoreError::not_found(&label))?;
        let stored: O = Self::decode(&body)?;
        if stored.meta().resource_version != object.meta().resource_version {
            return Err(StoreError::conflict(label, "resource version is stale"));
        }

        replace_status(&mut body, serde_json::to_value(object)?.get("status").cloned());
        let mut next: O = Self::decode(&body)?;
        next.meta_mut().resource_version = self.next_revision();
        let body = serde_json::to_value(&next)?;
        state.objects.insert(slot, body.clone());
        drop(state);

        self.publish(vec![WatchEvent::applied(next.object_ref(), body)]).await;
        Ok(next)
    }

    async fn delete(&self, name: &str) -> StoreResult<()> {
        self.check_fault(Operation::Delete, O::KIND).await?;
        let slot = (O::KIND.to_string(), name.to_string());
        let label = object_label::<O>(name);

        let mut state = self.state.write().await;
        let stored_value = state
            .objects
            .get(&slot)
            .cloned()
            .ok_or_else(|| StoreError::not_found(&label))?;
        let mut stored: O = Self::decode(&stored_value)?;

        let mut events = Vec::new();
        if stored.meta().finalizers.is_empty() {
            state.objects.remove(&slot);
            events.push(WatchEvent::deleted(stored.object_ref(), stored_value));
            state.collect_garbage(&stored.meta().uid, &mut events);
        } else if !stored.meta().is_being_deleted() {
            let meta = stored.meta_mut();
            meta.deletion_timestamp = Some(Utc::now());
            meta.resource_version = self.next_revision();
            let body = serde_json::to_value(&stored)?;
            state.objects.insert(slot, body.clone());
            events.push(WatchEvent::applied(stored.object_ref(), body));
            debug!(object = %label, "Deletion requested, waiting on finalizers");
        }
        drop(state);

        self.publish(events).await;
        Ok(())
    }
}

#[async_trait]
impl ChildStore for InMemoryStore {
    async fn get(&self, key: &ChildKey) -> StoreResult<Option<LiveChild>> {
        self.check_fault(Operation::Get, key.kind.as_str()).await?;
        Ok(self.state.read().await.children.get(key).cloned())
    }

    async fn create(&self, descriptor: &ChildDescriptor) -> StoreResult<LiveChild> {
        let key = &descriptor.key;
        self.check_fault(Operation::Create, key.kind.as_str()).await?;

        let mut state = self.state.write().await;
        if state.children.contains_key(key) {
            return Err(StoreError::already_exists(key.to_string()));
        }
        if let Some(namespace) = key.namespace.as_deref().filter(|ns| !state.namespace_exists(ns)) {
            return Err(StoreError::not_found(format!("Namespace/{namespace}")));
        }

        let mut child = LiveChild::from_descriptor(descriptor, Ulid::new().to_string(), self.next_revision());
        if let ChildSpec::Service(spec) = &mut child.spec {
            if spec.service_type == ServiceType::NodePort && spec.node_port.is_none() {
                spec.node_port = Some(self.next_node_port());
            }
        }
        state.insert_child(child.clone());
        drop(state);

        self.publish(vec![child_event(&child, false)]).await;
        Ok(child)
    }

    async fn update(&self, child: &LiveChild) -> StoreResult<LiveChild> {
        let key = &child.key;
        self.check_fault(Operation::Update, key.kind.as_str()).await?;

        let mut state = self.state.write().await;
        let stored = state
            .children
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(key.to_string()))?;
        if stored.resource_version != child.resource_version {
            return Err(StoreError::conflict(key.to_string(), "resource version is stale"));
        }

        let next = LiveChild {
            uid: stored.uid,
            owner: stored.owner,
            claimed_by: stored.claimed_by,
            created_at: stored.created_at,
            resource_version: self.next_revision(),
            ..child.clone()
        };
        state.children.insert(key.clone(), next.clone());
        drop(state);

        self.publish(vec![child_event(&next, false)]).await;
        Ok(next)
    }

    async fn delete(&self, key: &ChildKey) -> StoreResult<()> {
        self.check_fault(Operation::Delete, key.kind.as_str()).await?;

        let mut state = self.state.write().await;
        let mut events = Vec::new();
        let removed = state.remove_child(key, &mut events);
        drop(state);

        if removed.is_none() {
            return Err(StoreError::not_found(key.to_string()));
        }
        self.publish(events).await;
        Ok(())
    }

    async fn list_owned(&self, kind: ChildKind, owner_uid: &str) -> StoreResult<Vec<LiveChild>> {
        self.check_fault(Operation::List, kind.as_str()).await?;
        let state = self.state.read().await;
        Ok(state
            .owned
            .get(owner_uid)
            .into_iter()
            .flatten()
            .filter(|key| key.kind == kind)
            .filter_map(|key| state.children.get(key).cloned())
            .collect())
    }

    async fn list_claimed(&self, claimant_uid: &str) -> StoreResult<Vec<LiveChild>> {
        self.check_fault(Operation::List, CLAIMED_TARGET).await?;
        let state = self.state.read().await;
        Ok(state
            .claimed
            .get(claimant_uid)
            .into_iter()
            .flatten()
            .filter_map(|key| state.children.get(key).cloned())
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::collections::BTreeMap;

    use kubelab_events::{EventStore, InMemoryEventStore};

    use super::*;
    use crate::api::{Account, Classroom};
    use crate::children::spec::ServiceSpec;

    fn namespace(name: &str) -> ChildDescriptor {
        ChildDescriptor::cluster(name, ChildSpec::Namespace)
    }

    fn service(namespace: &str, name: &str, owner_uid: &str) -> ChildDescriptor {
        ChildDescriptor::namespaced(
            namespace,
            name,
            ChildSpec::Service(ServiceSpec {
                service_type: ServiceType::NodePort,
                selector: BTreeMap::new(),
                port: 22,
                node_port: None,
            }),
        )
        .owned_by(kubelab_events::OwnerRef::new("Classroom", "networks", owner_uid))
    }

    #[tokio::test]
    async fn test_create_assigns_identity() {
        let store = InMemoryStore::new();
        let created = ObjectStore::<Account>::create(&store, Account::new("alice", "alice")).await.unwrap();
        assert!(!created.metadata.uid.is_empty());
        assert!(created.metadata.resource_version > 0);

        let again = ObjectStore::<Account>::create(&store, Account::new("alice", "alice")).await;
        assert!(matches!(again, Err(StoreError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = InMemoryStore::new();
        let created = ObjectStore::<Account>::create(&store, Account::new("alice", "alice")).await.unwrap();

        let mut first = created.clone();
        first.spec.is_teacher = true;
        ObjectStore::<Account>::update(&store, &first).await.unwrap();

        let result = ObjectStore::<Account>::update(&store, &created).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_update_keeps_status_and_update_status_keeps_spec() {
        let store = InMemoryStore::new();
        let mut account = ObjectStore::<Account>::create(&store, Account::new("alice", "alice")).await.unwrap();

        account.status.mount_name = "home-mount".into();
        account.spec.is_teacher = true;
        let account = ObjectStore::<Account>::update_status(&store, &account).await.unwrap();
        assert_eq!(account.status.mount_name, "home-mount");
        assert!(!account.spec.is_teacher);

        let mut edited = account.clone();
        edited.status.mount_name.clear();
        edited.spec.id = "a2".into();
        let edited = ObjectStore::<Account>::update(&store, &edited).await.unwrap();
        assert_eq!(edited.spec.id, "a2");
        assert_eq!(edited.status.mount_name, "home-mount");
    }

    #[tokio::test]
    async fn test_delete_with_finalizer_only_marks() {
        let store = InMemoryStore::new();
        let mut classroom = Classroom::new("networks", "carol", "ubuntu");
        classroom.metadata.finalizers.push("classroom.kubelab.local/finalizer".into());
        let classroom = ObjectStore::<Classroom>::create(&store, classroom).await.unwrap();

        ObjectStore::<Classroom>::delete(&store, "networks").await.unwrap();
        let marked: Classroom = ObjectStore::<Classroom>::get(&store, "networks").await.unwrap().unwrap();
        assert!(marked.metadata.is_being_deleted());
        assert!(marked.metadata.resource_version > classroom.metadata.resource_version);

        let mut released = marked.clone();
        released.metadata.finalizers.clear();
        ObjectStore::<Classroom>::update(&store, &released).await.unwrap();
        assert!(ObjectStore::<Classroom>::get(&store, "networks").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deleting_owner_collects_owned_children() {
        let store = InMemoryStore::new();
        let classroom = ObjectStore::<Classroom>::create(&store, Classroom::new("networks", "carol", "ubuntu"))
            .await
            .unwrap();
        let uid = classroom.metadata.uid.clone();

        ChildStore::create(&store, &namespace("alice")).await.unwrap();
        ChildStore::create(&store, &service("alice", "networks", &uid)).await.unwrap();
        assert_eq!(store.child_count().await, 2);

        ObjectStore::<Classroom>::delete(&store, "networks").await.unwrap();
        let left = store.children().await;
        assert_eq!(left.len(), 1);
        assert_eq!(left.first().map(|c| c.key.kind), Some(ChildKind::Namespace));
    }

    #[tokio::test]
    async fn test_namespace_delete_removes_contents() {
        let store = InMemoryStore::new();
        ChildStore::create(&store, &namespace("alice")).await.unwrap();
        ChildStore::create(&store, &service("alice", "networks", "u1")).await.unwrap();

        ChildStore::delete(&store, &ChildKey::cluster(ChildKind::Namespace, "alice")).await.unwrap();
        assert_eq!(store.child_count().await, 0);
        assert!(ChildStore::list_owned(&store, ChildKind::Service, "u1").await.unwrap().is_empty());

        let again = ChildStore::delete(&store, &ChildKey::cluster(ChildKind::Namespace, "alice")).await;
        assert!(matches!(again, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_namespaced_create_requires_namespace() {
        let store = InMemoryStore::new();
        let result = ChildStore::create(&store, &service("ghost", "networks", "u1")).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_node_port_assigned_on_create() {
        let store = InMemoryStore::new();
        ChildStore::create(&store, &namespace("alice")).await.unwrap();
        let live = ChildStore::create(&store, &service("alice", "networks", "u1")).await.unwrap();

        let port = live.spec.as_service().and_then(|s| s.node_port).unwrap();
        assert!(port >= NODE_PORT_BASE);
    }

    #[tokio::test]
    async fn test_list_owned_filters_kind_and_owner() {
        let store = InMemoryStore::new();
        ChildStore::create(&store, &namespace("alice")).await.unwrap();
        ChildStore::create(&store, &namespace("bob")).await.unwrap();
        ChildStore::create(&store, &service("alice", "networks", "u1")).await.unwrap();
        ChildStore::create(&store, &service("bob", "networks", "u2")).await.unwrap();

        let owned = ChildStore::list_owned(&store, ChildKind::Service, "u1").await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned.first().and_then(|c| c.key.namespace.as_deref()), Some("alice"));
        assert!(ChildStore::list_owned(&store, ChildKind::Workload, "u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claimed_children_are_indexed_by_claimant() {
        let store = InMemoryStore::new();
        let claimant = kubelab_events::OwnerRef::new("KubelabUser", "alice", "u1");
        ChildStore::create(&store, &namespace("s1").claimed_by(claimant.clone())).await.unwrap();
        ChildStore::create(&store, &namespace("s2").claimed_by(claimant)).await.unwrap();
        ChildStore::create(&store, &namespace("shared")).await.unwrap();

        let claimed = ChildStore::list_claimed(&store, "u1").await.unwrap();
        let names: Vec<_> = claimed.iter().map(|c| c.key.name.as_str()).collect();
        assert_eq!(names, vec!["s1", "s2"]);
        assert!(ChildStore::list_claimed(&store, "u2").await.unwrap().is_empty());

        let mut live = claimed.first().cloned().unwrap();
        live.claimed_by = None;
        ChildStore::update(&store, &live).await.unwrap();
        ChildStore::delete(&store, &ChildKey::cluster(ChildKind::Namespace, "s2")).await.unwrap();

        let left = ChildStore::list_claimed(&store, "u1").await.unwrap();
        assert_eq!(left.len(), 1);
        assert!(left.iter().all(|c| c.is_claimed_by("u1")));
    }

    #[tokio::test]
    async fn test_deleting_claimant_leaves_claimed_children() {
        let store = InMemoryStore::new();
        let account = ObjectStore::<Account>::create(&store, Account::new("alice", "alice")).await.unwrap();
        let claimant = kubelab_events::OwnerRef::new("KubelabUser", "alice", &account.metadata.uid);
        ChildStore::create(&store, &namespace("alice").claimed_by(claimant)).await.unwrap();

        ObjectStore::<Account>::delete(&store, "alice").await.unwrap();
        assert_eq!(store.child_count().await, 1);
    }

    #[tokio::test]
    async fn test_faults_fire_the_requested_number_of_times() {
        let store = InMemoryStore::new();
        store.inject_fault(Fault::child(Operation::Create, ChildKind::Namespace, "quota").times(1)).await;

        let first = ChildStore::create(&store, &namespace("alice")).await;
        assert!(matches!(first, Err(StoreError::Backend { .. })));
        assert!(ChildStore::create(&store, &namespace("alice")).await.is_ok());
    }

    #[tokio::test]
    async fn test_changes_are_published() {
        let journal = Arc::new(InMemoryEventStore::new(64));
        let bus = Arc::new(EventBus::journaled(journal.clone()));
        let store = InMemoryStore::with_bus(bus);

        ChildStore::create(&store, &namespace("alice")).await.unwrap();
        ChildStore::delete(&store, &ChildKey::cluster(ChildKind::Namespace, "alice")).await.unwrap();

        let events = journal.read(None).await.unwrap();
        let types: Vec<_> = events.iter().map(WatchEvent::event_type).collect();
        assert_eq!(types, vec!["applied", "deleted"]);
    }
}
