//! K8s-style reconciliation of Kubelab accounts and classrooms.
//!
//! Each managed kind declares what child resources it needs; one generic
//! engine drives the live platform toward that declaration:
//!
//! - **Validate**: resolve references through the registry index
//! - **Render**: build the ordered plan of child descriptors
//! - **Ensure**: create missing children, delete ones that must be absent
//! - **Correct drift**: realign mutable fields of existing children
//! - **Reconcile membership**: remove children of departed members
//! - **Project status**: report the outcome as conditions
//!
//! A pass performs at most one mutation and asks to be requeued, so every
//! decision is taken against freshly read state.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use kubelab_events::EventBus;
//! use kubelab_reconciler::{
//!     Account, Controller, InMemoryStore, Reconciler, ReconcilerConfig, RegistryIndex,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = Arc::new(EventBus::new());
//!     let store = Arc::new(InMemoryStore::with_bus(bus.clone()));
//!     let registry = Arc::new(RegistryIndex::new());
//!     let config = Arc::new(ReconcilerConfig::default());
//!
//!     let accounts = Arc::new(Reconciler::<Account>::new(
//!         store.clone(),
//!         store.clone(),
//!         registry,
//!         config,
//!     ));
//!     let handle = Controller::new(accounts, bus).start().await;
//!     // ...
//!     handle.stop().await;
//! }
//! ```

#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod api;
pub mod children;
pub mod config;
pub mod controller;
pub mod drift;
pub mod ensure;
pub mod error;
pub mod finalizer;
pub mod managed;
pub mod membership;
pub mod plan;
pub mod reconciler;
pub mod registry;
pub mod status;
pub mod store;

// Re-export main types
pub use api::{Account, AccountSpec, AccountStatus, Classroom, ClassroomSpec, ClassroomStatus, Condition, ConditionKind, ConditionStatus, ObjectMeta};
pub use children::{ChildDescriptor, ChildKey, ChildKind, ChildSpec, LiveChild};
pub use config::ReconcilerConfig;
pub use controller::{Controller, ControllerHandle, WorkQueue};
pub use error::{ReconcileError, Result, StoreError, StoreResult, ValidationError};
pub use managed::Managed;
pub use plan::Plan;
pub use reconciler::{Action, Reconciler};
pub use registry::{RegistryIndex, RegistryRecord, RegistryWatcher, Role};
pub use store::{ChildStore, Fault, InMemoryStore, ObjectStore, Operation};
