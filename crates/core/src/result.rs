//! Result type for Kubelab core operations.

use crate::error::Error;

/// The standard Result type for Kubelab core operations.
pub type Result<T> = std::result::Result<T, Error>;
