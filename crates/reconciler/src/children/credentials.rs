//! Bcrypt hashes for passwords injected into workloads.

use crate::error::{ReconcileError, Result};

/// Hash `secret` with a fresh salt at the given work factor.
///
/// The result is a standard `$2b$` modular-crypt string.
///
/// # Errors
///
/// Returns `Provisioning` if bcrypt rejects the cost or fails to hash.
pub fn hash_secret(secret: &str, cost: u32) -> Result<String> {
    bcrypt::hash(secret, cost).map_err(|e| ReconcileError::provisioning("password hash", e.to_string()))
}
