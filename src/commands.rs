//! CLI command handlers.
//!
//! All commands follow the same shape:
//! - Zero unwraps, zero panics
//! - `anyhow` context at this layer only, typed errors below it

#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]
#![forbid(clippy::panic)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use kubelab_events::EventBusBuilder;
use kubelab_reconciler::api::find_condition;
use kubelab_reconciler::{
    Account, ChildDescriptor, Classroom, ConditionKind, Controller, InMemoryStore, Managed, ObjectStore,
    ReconcileError, Reconciler, ReconcilerConfig, RegistryIndex, RegistryRecord, RegistryWatcher,
};
use serde::Serialize;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use crate::cli::{Commands, OutputFormat};
use crate::manifests::Manifests;

/// Execute a CLI command.
pub async fn execute_command(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            config,
            manifests,
            run_for,
        } => cmd_run(config.as_deref(), &manifests, run_for).await,

        Commands::Render {
            config,
            manifests,
            format,
        } => cmd_render(config.as_deref(), &manifests, format),
    }
}

/// Load the configuration file if given, then apply environment overrides.
fn load_config(path: Option<&Path>) -> Result<ReconcilerConfig> {
    let config = match path {
        Some(path) => ReconcilerConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ReconcilerConfig::default(),
    }
    .from_env();
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Child descriptors one manifest object converges to.
#[derive(Debug, Serialize)]
pub struct RenderedObject {
    pub object: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ChildDescriptor>,
}

fn render_object<O: Managed>(object: &O, registry: &RegistryIndex, config: &ReconcilerConfig) -> RenderedObject {
    let rendered = object
        .validate(registry)
        .map_err(ReconcileError::from)
        .and_then(|resolved| object.render(&resolved, config));
    let (error, children) = match rendered {
        Ok(plan) => (None, plan.into_iter().collect()),
        Err(e) => (Some(e.to_string()), Vec::new()),
    };
    RenderedObject {
        object: object.object_ref().to_string(),
        error,
        children,
    }
}

/// Render every object in the manifests without touching a platform.
///
/// References resolve against the accounts declared in the same manifests.
pub fn render_manifests(manifests: &Manifests, config: &ReconcilerConfig) -> Vec<RenderedObject> {
    let registry = RegistryIndex::new();
    registry.replace_all(manifests.accounts.iter().map(RegistryRecord::from));

    manifests
        .accounts
        .iter()
        .map(|account| render_object(account, &registry, config))
        .chain(
            manifests
                .classrooms
                .iter()
                .map(|classroom| render_object(classroom, &registry, config)),
        )
        .collect()
}

fn cmd_render(config: Option<&Path>, paths: &[PathBuf], format: OutputFormat) -> Result<()> {
    let config = load_config(config)?;
    let manifests = Manifests::load(paths).context("Failed to load manifests")?;
    let rendered = render_manifests(&manifests, &config);

    let output = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&rendered).context("Failed to encode JSON")?,
        OutputFormat::Yaml => serde_yaml::to_string(&rendered).context("Failed to encode YAML")?,
    };
    println!("{output}");
    Ok(())
}

/// Store every declared object, accounts first.
async fn seed(store: &InMemoryStore, manifests: Manifests) -> Result<()> {
    for account in manifests.accounts {
        let name = account.metadata.name.clone();
        ObjectStore::<Account>::create(store, account)
            .await
            .with_context(|| format!("Failed to create account {name}"))?;
    }
    for classroom in manifests.classrooms {
        let name = classroom.metadata.name.clone();
        ObjectStore::<Classroom>::create(store, classroom)
            .await
            .with_context(|| format!("Failed to create classroom {name}"))?;
    }
    Ok(())
}

/// One line per object with its Available condition.
async fn report<O: Managed>(store: &InMemoryStore) -> Result<()> {
    let objects = ObjectStore::<O>::list(store)
        .await
        .with_context(|| format!("Failed to list {}", O::KIND))?;
    for object in objects {
        let available = find_condition(object.conditions(), ConditionKind::Available)
            .map_or_else(|| "Unknown".to_string(), |c| format!("{:?}: {}", c.status, c.message));
        println!("{:<40} {available}", object.object_ref().to_string());
    }
    Ok(())
}

async fn cmd_run(config: Option<&Path>, paths: &[PathBuf], run_for: Option<u64>) -> Result<()> {
    let config = Arc::new(load_config(config)?);
    let manifests = Manifests::load(paths).context("Failed to load manifests")?;
    info!(objects = manifests.len(), workers = config.workers, "Starting controllers");

    let bus = Arc::new(
        EventBusBuilder::new()
            .with_subscriber_capacity(config.event_capacity)
            .build()
            .context("Failed to build the event bus")?,
    );
    let store = Arc::new(InMemoryStore::with_bus(bus.clone()));
    let registry = Arc::new(RegistryIndex::new());

    let (stop_watcher, watcher_rx) = watch::channel(false);
    let account_store: Arc<dyn ObjectStore<Account>> = store.clone();
    let watcher = RegistryWatcher::new(registry.clone(), account_store, bus.clone())
        .start(watcher_rx)
        .await
        .context("Failed to prime the registry index")?;

    let accounts = Controller::new(
        Arc::new(Reconciler::<Account>::new(
            store.clone(),
            store.clone(),
            registry.clone(),
            config.clone(),
        )),
        bus.clone(),
    )
    .start()
    .await;
    let classrooms = Controller::new(
        Arc::new(Reconciler::<Classroom>::new(store.clone(), store.clone(), registry, config)),
        bus,
    )
    .start()
    .await;

    seed(&store, manifests).await?;

    match run_for {
        Some(secs) => {
            info!(secs, "Running for a fixed duration");
            tokio::time::sleep(Duration::from_secs(secs)).await;
        }
        None => {
            info!("Kubelab is running. Press Ctrl+C to stop.");
            wait_for_shutdown().await;
        }
    }

    classrooms.stop().await;
    accounts.stop().await;
    let _ = stop_watcher.send(true);
    if let Err(e) = watcher.await {
        error!(error = %e, "Registry watcher ended abnormally");
    }

    report::<Account>(&store).await?;
    report::<Classroom>(&store).await?;
    info!(children = store.child_count().await, "Kubelab stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use kubelab_reconciler::ChildKind;

    use super::*;

    fn lab() -> Manifests {
        Manifests {
            accounts: vec![
                Account::new("carol", "carol").teacher(),
                Account::new("alice", "alice"),
            ],
            classrooms: vec![
                Classroom::new("networks", "carol", "ubuntu:22.04").with_students(["alice"]),
                Classroom::new("orphaned", "nobody", "ubuntu:22.04"),
            ],
        }
    }

    fn config() -> ReconcilerConfig {
        ReconcilerConfig {
            password_hash_cost: 4,
            ..ReconcilerConfig::default()
        }
    }

    #[test]
    fn test_render_lists_children_per_object() {
        let rendered = render_manifests(&lab(), &config());
        assert_eq!(rendered.len(), 4);

        let carol = rendered.first().unwrap();
        assert_eq!(carol.object, "KubelabUser/carol");
        assert_eq!(carol.children.len(), 5);

        let networks = rendered.get(2).unwrap();
        assert!(networks.error.is_none());
        let workloads = networks.children.iter().filter(|c| c.kind() == ChildKind::Workload).count();
        assert_eq!(workloads, 1);
    }

    #[test]
    fn test_render_reports_unresolved_references() {
        let rendered = render_manifests(&lab(), &config());
        let orphaned = rendered.get(3).unwrap();
        assert!(orphaned.children.is_empty());
        assert!(orphaned.error.as_deref().unwrap().contains("nobody"));
    }

    #[test]
    fn test_load_config_defaults_without_file() {
        let config = load_config(None).unwrap();
        assert!(config.workers >= 1);
    }
}
