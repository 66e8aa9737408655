//! Configuration for the reconcilers and their dispatcher.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;

/// Engine tuning and platform naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Concurrent reconcile workers per controller.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Delay before the pass that follows a child create or delete.
    #[serde(default = "default_create_requeue_secs")]
    pub create_requeue_secs: u64,

    /// Fixed backoff after a validation failure.
    #[serde(default = "default_validation_backoff_secs")]
    pub validation_backoff_secs: u64,

    /// Backoff after any other failure.
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,

    /// Deadline for a single pass.
    #[serde(default = "default_pass_timeout_secs")]
    pub pass_timeout_secs: u64,

    /// Interval between full resyncs.
    #[serde(default = "default_resync_period_secs")]
    pub resync_period_secs: u64,

    /// Fresh-read restarts allowed after write conflicts within one pass.
    #[serde(default = "default_conflict_retries")]
    pub conflict_retries: u32,

    /// Capacity of the watch-event channels feeding the controllers.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Prefix of the group bound to an account's role.
    #[serde(default = "default_group_prefix")]
    pub group_prefix: String,

    #[serde(default = "default_storage_class")]
    pub storage_class: String,

    /// NFS server exporting classroom data.
    #[serde(default = "default_nfs_server")]
    pub nfs_server: String,

    /// Export path holding one directory per classroom.
    #[serde(default = "default_class_data_root")]
    pub class_data_root: String,

    /// Image of the per-account home-mount workload.
    #[serde(default = "default_mount_image")]
    pub mount_image: String,

    #[serde(default = "default_user_storage_request")]
    pub user_storage_request: String,

    #[serde(default = "default_class_storage_request")]
    pub class_storage_request: String,

    /// Bcrypt work factor for passwords injected into workloads.
    #[serde(default = "default_password_hash_cost")]
    pub password_hash_cost: u32,
}

/// Work factors bcrypt accepts.
pub const PASSWORD_HASH_COSTS: std::ops::RangeInclusive<u32> = 4..=31;

const fn default_workers() -> usize {
    4
}

const fn default_create_requeue_secs() -> u64 {
    10
}

const fn default_validation_backoff_secs() -> u64 {
    60
}

const fn default_error_backoff_secs() -> u64 {
    10
}

const fn default_pass_timeout_secs() -> u64 {
    30
}

const fn default_resync_period_secs() -> u64 {
    300
}

const fn default_conflict_retries() -> u32 {
    3
}

const fn default_event_capacity() -> usize {
    1024
}

fn default_group_prefix() -> String {
    "kubelab:".to_string()
}

fn default_storage_class() -> String {
    "nfs-client".to_string()
}

fn default_nfs_server() -> String {
    "nfs.kubelab.local".to_string()
}

fn default_class_data_root() -> String {
    "/srv/kubernetes/class".to_string()
}

fn default_mount_image() -> String {
    "filebrowser/filebrowser:v2".to_string()
}

fn default_user_storage_request() -> String {
    "1Gi".to_string()
}

fn default_class_storage_request() -> String {
    "100Mi".to_string()
}

const fn default_password_hash_cost() -> u32 {
    10
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            create_requeue_secs: default_create_requeue_secs(),
            validation_backoff_secs: default_validation_backoff_secs(),
            error_backoff_secs: default_error_backoff_secs(),
            pass_timeout_secs: default_pass_timeout_secs(),
            resync_period_secs: default_resync_period_secs(),
            conflict_retries: default_conflict_retries(),
            event_capacity: default_event_capacity(),
            group_prefix: default_group_prefix(),
            storage_class: default_storage_class(),
            nfs_server: default_nfs_server(),
            class_data_root: default_class_data_root(),
            mount_image: default_mount_image(),
            user_storage_request: default_user_storage_request(),
            class_storage_request: default_class_storage_request(),
            password_hash_cost: default_password_hash_cost(),
        }
    }
}

impl ReconcilerConfig {
    /// Load from a TOML, JSON or YAML file and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a value
    /// is out of range.
    pub fn from_file(path: &Path) -> kubelab_core::Result<Self> {
        let config: Self = kubelab_core::config::load_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `KUBELAB_*` overrides from the process environment.
    #[must_use]
    pub fn from_env(self) -> Self {
        self.from_env_with(|key| std::env::var(key).ok())
    }

    /// Apply `KUBELAB_*` overrides using `lookup` to read variables.
    ///
    /// Unparseable numbers are ignored.
    #[must_use]
    pub fn from_env_with<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(workers) = number("KUBELAB_WORKERS").and_then(|v| usize::try_from(v).ok()) {
            self.workers = workers;
        }
        if let Some(secs) = number("KUBELAB_CREATE_REQUEUE_SECS") {
            self.create_requeue_secs = secs;
        }
        if let Some(secs) = number("KUBELAB_VALIDATION_BACKOFF_SECS") {
            self.validation_backoff_secs = secs;
        }
        if let Some(secs) = number("KUBELAB_ERROR_BACKOFF_SECS") {
            self.error_backoff_secs = secs;
        }
        if let Some(secs) = number("KUBELAB_PASS_TIMEOUT_SECS") {
            self.pass_timeout_secs = secs;
        }
        if let Some(secs) = number("KUBELAB_RESYNC_PERIOD_SECS") {
            self.resync_period_secs = secs;
        }
        if let Some(retries) = number("KUBELAB_CONFLICT_RETRIES").and_then(|v| u32::try_from(v).ok()) {
            self.conflict_retries = retries;
        }
        if let Some(capacity) = number("KUBELAB_EVENT_CAPACITY").and_then(|v| usize::try_from(v).ok()) {
            self.event_capacity = capacity;
        }
        if let Some(cost) = number("KUBELAB_PASSWORD_HASH_COST").and_then(|v| u32::try_from(v).ok()) {
            self.password_hash_cost = cost;
        }
        if let Some(prefix) = lookup("KUBELAB_GROUP_PREFIX") {
            self.group_prefix = prefix;
        }
        if let Some(class) = lookup("KUBELAB_STORAGE_CLASS") {
            self.storage_class = class;
        }
        if let Some(server) = lookup("KUBELAB_NFS_SERVER") {
            self.nfs_server = server;
        }
        if let Some(root) = lookup("KUBELAB_CLASS_DATA_ROOT") {
            self.class_data_root = root;
        }
        if let Some(image) = lookup("KUBELAB_MOUNT_IMAGE") {
            self.mount_image = image;
        }
        self
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecord` naming the first offending field.
    pub fn validate(&self) -> kubelab_core::Result<()> {
        let invalid = |reason: &str| Err(kubelab_core::Error::invalid_record(reason));

        if self.workers == 0 {
            return invalid("workers must be at least 1");
        }
        if self.pass_timeout_secs == 0 {
            return invalid("pass_timeout_secs must be positive");
        }
        if self.resync_period_secs == 0 {
            return invalid("resync_period_secs must be positive");
        }
        if self.event_capacity == 0 {
            return invalid("event_capacity must be at least 1");
        }
        if !PASSWORD_HASH_COSTS.contains(&self.password_hash_cost) {
            return invalid("password_hash_cost must be between 4 and 31");
        }
        for (field, value) in [
            ("storage_class", &self.storage_class),
            ("nfs_server", &self.nfs_server),
            ("class_data_root", &self.class_data_root),
            ("mount_image", &self.mount_image),
            ("user_storage_request", &self.user_storage_request),
            ("class_storage_request", &self.class_storage_request),
        ] {
            if value.trim().is_empty() {
                return Err(kubelab_core::Error::invalid_record(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }

    pub const fn create_requeue(&self) -> Duration {
        Duration::from_secs(self.create_requeue_secs)
    }

    pub const fn validation_backoff(&self) -> Duration {
        Duration::from_secs(self.validation_backoff_secs)
    }

    pub const fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub const fn pass_timeout(&self) -> Duration {
        Duration::from_secs(self.pass_timeout_secs)
    }

    pub const fn resync_period(&self) -> Duration {
        Duration::from_secs(self.resync_period_secs)
    }

    /// Requeue delay for a failed pass.
    pub const fn backoff_for(&self, error: &ReconcileError) -> Duration {
        match error {
            ReconcileError::Validation(_) => self.validation_backoff(),
            _ => self.error_backoff(),
        }
    }
}
