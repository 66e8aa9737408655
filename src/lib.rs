#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]
#![forbid(clippy::panic)]

//! # Kubelab
//!
//! Command-line front end for the Kubelab controllers: argument parsing,
//! manifest loading and the `run`/`render` command handlers.

pub mod cli;
pub mod commands;
pub mod manifests;

pub use manifests::Manifests;
