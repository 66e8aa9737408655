//! Error types for the reconciler crate.

use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures reported by object and child stores.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed object does not exist.
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// Optimistic concurrency check failed.
    #[error("conflict writing {resource}: {reason}")]
    Conflict { resource: String, reason: String },

    /// Create collided with an existing object.
    #[error("{resource} already exists")]
    AlreadyExists { resource: String },

    /// The backend refused or failed the operation.
    #[error("store operation '{operation}' failed: {reason}")]
    Backend { operation: String, reason: String },

    /// The stored document could not be (de)serialized.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

impl StoreError {
    /// Create a not-found error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a conflict error.
    pub fn conflict(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Create an already-exists error.
    pub fn already_exists(resource: impl Into<String>) -> Self {
        Self::AlreadyExists {
            resource: resource.into(),
        }
    }

    /// Create a backend error.
    pub fn backend(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    /// Whether this is a not-found error.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the write lost a race and should be retried from a fresh read.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::AlreadyExists { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// A declared reference could not be resolved or is malformed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// No owner was declared.
    #[error("no teacher declared")]
    MissingOwner,

    /// A referenced account does not exist.
    #[error("account '{id}' does not exist")]
    UnknownAccount { id: String },

    /// The owner exists but lacks the privileged role.
    #[error("account '{id}' is not a teacher")]
    NotPrivileged { id: String },

    /// A business identifier is not usable as a namespace name.
    #[error("invalid id '{id}': {reason}")]
    InvalidIdentifier { id: String, reason: String },

    /// Another account already claims the business identifier.
    #[error("id '{id}' is already claimed by account '{claimed_by}'")]
    DuplicateIdentifier { id: String, claimed_by: String },

    /// No container image was declared.
    #[error("no template container declared")]
    MissingImage,
}

impl ValidationError {
    /// Create an unknown-account error.
    pub fn unknown_account(id: impl Into<String>) -> Self {
        Self::UnknownAccount { id: id.into() }
    }

    /// Create a not-privileged error.
    pub fn not_a_teacher(id: impl Into<String>) -> Self {
        Self::NotPrivileged { id: id.into() }
    }

    /// Create an invalid-identifier error.
    pub fn invalid_identifier(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by a reconcile pass.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// Declared references failed validation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Creating, updating or deleting a child failed.
    #[error("provisioning {resource} failed: {reason}")]
    Provisioning { resource: String, reason: String },

    /// Deleting an explicit child during finalization failed.
    #[error("finalizing {resource} failed: {reason}")]
    Finalization { resource: String, reason: String },

    /// A write lost an optimistic concurrency race.
    #[error("conflict on {resource}")]
    Conflict { resource: String },

    /// Reading or writing the managed object itself failed.
    #[error("store operation '{operation}' failed: {reason}")]
    Store { operation: String, reason: String },

    /// A pass exceeded its time budget.
    #[error("reconcile pass timed out after {secs}s")]
    Timeout { secs: u64 },
}

impl ReconcileError {
    /// Create a provisioning error.
    pub fn provisioning(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Provisioning {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Create a finalization error.
    pub fn finalization(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Finalization {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Classify a failed child operation.
    pub fn from_child(resource: impl Into<String>, err: StoreError) -> Self {
        let resource = resource.into();
        if err.is_conflict() {
            Self::Conflict { resource }
        } else {
            Self::Provisioning {
                resource,
                reason: err.to_string(),
            }
        }
    }

    /// Classify a failed read or write of the managed object.
    pub fn from_object(operation: impl Into<String>, resource: impl Into<String>, err: StoreError) -> Self {
        if err.is_conflict() {
            Self::Conflict {
                resource: resource.into(),
            }
        } else {
            Self::Store {
                operation: operation.into(),
                reason: err.to_string(),
            }
        }
    }

    /// Whether the pass should restart from a fresh read.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether the failure is a validation failure.
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Short label used in logs.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Provisioning { .. } => "provisioning",
            Self::Finalization { .. } => "finalization",
            Self::Conflict { .. } => "conflict",
            Self::Store { .. } => "store",
            Self::Timeout { .. } => "timeout",
        }
    }
}
