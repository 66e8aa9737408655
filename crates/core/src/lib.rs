//! Core types, errors, and document loading shared by the Kubelab crates.

#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod config;
pub mod error;
pub mod manifest;
pub mod result;

pub use error::Error;
pub use manifest::Document;
pub use result::Result;
