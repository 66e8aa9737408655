//! Storage seams between the engine and the platform it drives.

pub mod memory;

use async_trait::async_trait;

use crate::children::{ChildDescriptor, ChildKey, ChildKind, LiveChild};
use crate::error::StoreResult;
use crate::managed::Managed;

pub use memory::{Fault, InMemoryStore, Operation};

/// Access to managed objects of one kind.
///
/// Writes are version-checked: an object whose `resource_version` differs
/// from the stored one is rejected with `StoreError::Conflict`.
#[async_trait]
pub trait ObjectStore<O: Managed>: Send + Sync {
    /// Fetch by name; `None` when absent.
    async fn get(&self, name: &str) -> StoreResult<Option<O>>;

    async fn list(&self) -> StoreResult<Vec<O>>;

    async fn create(&self, object: O) -> StoreResult<O>;

    /// Write metadata and spec. Status is left as stored.
    async fn update(&self, object: &O) -> StoreResult<O>;

    /// Write status only.
    async fn update_status(&self, object: &O) -> StoreResult<O>;

    /// Request deletion. Objects holding finalizers are only marked.
    async fn delete(&self, name: &str) -> StoreResult<()>;
}

/// Access to child resources.
#[async_trait]
pub trait ChildStore: Send + Sync {
    /// Fetch by key; `None` when absent.
    async fn get(&self, key: &ChildKey) -> StoreResult<Option<LiveChild>>;

    /// Create from a descriptor; `AlreadyExists` if the key is taken.
    async fn create(&self, descriptor: &ChildDescriptor) -> StoreResult<LiveChild>;

    /// Version-checked replace of a live child.
    async fn update(&self, child: &LiveChild) -> StoreResult<LiveChild>;

    /// Delete; `NotFound` if already gone.
    async fn delete(&self, key: &ChildKey) -> StoreResult<()>;

    /// Children of a kind whose owner link carries `owner_uid`.
    async fn list_owned(&self, kind: ChildKind, owner_uid: &str) -> StoreResult<Vec<LiveChild>>;

    /// Unowned children of any kind claimed by `claimant_uid`.
    async fn list_claimed(&self, claimant_uid: &str) -> StoreResult<Vec<LiveChild>>;
}
