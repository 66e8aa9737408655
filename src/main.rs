//! # Kubelab - controller entry point
//!
//! Parses the command line, installs tracing and dispatches to the command
//! handlers.
//!
//! ## Commands
//!
//! - `run` loads manifests into the in-memory platform and runs the account
//!   and classroom controllers until Ctrl+C
//! - `render` prints the child resources each manifest object converges to
//!
//! Logging is controlled by `RUST_LOG` (default `info`).

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![forbid(clippy::expect_used)]

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use kubelab::cli::Cli;
use kubelab::commands::execute_command;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    execute_command(cli.command).await
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
