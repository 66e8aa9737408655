//! CLI command definitions using clap.

#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]
#![forbid(clippy::panic)]

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Kubelab - classroom lab controller
#[derive(Parser, Debug)]
#[command(name = "kubelab")]
#[command(version)]
#[command(about = "Converges lab accounts and classrooms into namespaces, workloads and storage")]
#[command(
    long_about = "Kubelab reads KubelabUser and Classroom manifests and drives the platform toward them: one namespace, access role, home mount and claim per account, and one workload, SSH endpoint and optional exam isolation per enrolled student."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load manifests and run both controllers until Ctrl+C
    Run {
        /// Reconciler configuration file (TOML, JSON or YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Manifest files holding KubelabUser and Classroom documents
        #[arg(short, long, num_args = 1..)]
        manifests: Vec<PathBuf>,

        /// Stop after this many seconds instead of waiting for Ctrl+C
        #[arg(long)]
        run_for: Option<u64>,
    },

    /// Print the child resources each manifest object converges to
    Render {
        /// Reconciler configuration file (TOML, JSON or YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Manifest files holding KubelabUser and Classroom documents
        #[arg(short, long, num_args = 1.., required = true)]
        manifests: Vec<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
}
