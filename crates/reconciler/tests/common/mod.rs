//! Shared harness for the reconciler integration tests.

#![allow(dead_code)]

use std::fmt::Display;
use std::sync::Arc;

use kubelab_events::{EventBus, EventStore, InMemoryEventStore};
use kubelab_reconciler::{
    Account, Action, ChildKey, ChildKind, ChildStore, Classroom, InMemoryStore, LiveChild, Managed, ObjectStore,
    Reconciler, ReconcilerConfig, RegistryIndex, RegistryWatcher,
};

pub type TestResult = Result<(), String>;

const MAX_PASSES: usize = 100;
const JOURNAL_CAPACITY: usize = 4096;
const TEST_HASH_COST: u32 = 4;

/// Attach context to an error and turn it into a test failure message.
pub fn ctx<E: Display>(context: &'static str) -> impl FnOnce(E) -> String {
    move |e| format!("{context}: {e}")
}

pub fn check(condition: bool, message: impl Into<String>) -> TestResult {
    if condition { Ok(()) } else { Err(message.into()) }
}

/// Run passes until the reconciler reports nothing left to do.
///
/// Returns the number of passes taken.
pub async fn converge<O: Managed>(reconciler: &Reconciler<O>, name: &str) -> Result<usize, String> {
    for pass in 1..=MAX_PASSES {
        match reconciler.reconcile(name).await {
            Ok(Action::AwaitChange) => return Ok(pass),
            Ok(Action::Requeue(_)) => {}
            Err(e) => return Err(format!("pass {pass} for {}/{name} failed: {e}", O::KIND)),
        }
    }
    Err(format!("{}/{name} did not converge within {MAX_PASSES} passes", O::KIND))
}

/// Run passes until one fails, returning that error's category.
pub async fn first_error<O: Managed>(reconciler: &Reconciler<O>, name: &str) -> Result<&'static str, String> {
    for _ in 0..MAX_PASSES {
        match reconciler.reconcile(name).await {
            Ok(Action::AwaitChange) => return Err(format!("{}/{name} converged unexpectedly", O::KIND)),
            Ok(Action::Requeue(_)) => {}
            Err(e) => return Ok(e.category()),
        }
    }
    Err(format!("{}/{name} never failed", O::KIND))
}

pub struct Harness {
    pub journal: Arc<InMemoryEventStore>,
    pub bus: Arc<EventBus>,
    pub store: Arc<InMemoryStore>,
    pub registry: Arc<RegistryIndex>,
    pub accounts: Reconciler<Account>,
    pub classrooms: Reconciler<Classroom>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ReconcilerConfig {
            password_hash_cost: TEST_HASH_COST,
            ..ReconcilerConfig::default()
        })
    }

    pub fn with_config(config: ReconcilerConfig) -> Self {
        let journal = Arc::new(InMemoryEventStore::new(JOURNAL_CAPACITY));
        let bus = Arc::new(EventBus::journaled(journal.clone()));
        let store = Arc::new(InMemoryStore::with_bus(bus.clone()));
        let registry = Arc::new(RegistryIndex::new());
        let config = Arc::new(config);

        let accounts = Reconciler::<Account>::new(store.clone(), store.clone(), registry.clone(), config.clone());
        let classrooms = Reconciler::<Classroom>::new(store.clone(), store.clone(), registry.clone(), config);
        Self {
            journal,
            bus,
            store,
            registry,
            accounts,
            classrooms,
        }
    }

    /// Rebuild the registry index from the stored accounts.
    pub async fn refresh_registry(&self) -> TestResult {
        let accounts: Arc<dyn ObjectStore<Account>> = self.store.clone();
        RegistryWatcher::new(self.registry.clone(), accounts, self.bus.clone())
            .prime()
            .await
            .map_err(ctx("priming registry"))?;
        Ok(())
    }

    /// Create and converge an account, then refresh the registry.
    pub async fn add_account(&self, account: Account) -> TestResult {
        let name = account.metadata.name.clone();
        ObjectStore::<Account>::create(self.store.as_ref(), account)
            .await
            .map_err(ctx("creating account"))?;
        converge(&self.accounts, &name).await?;
        self.refresh_registry().await
    }

    /// Teacher carol with students alice and bob, all converged.
    pub async fn enroll_defaults(&self) -> TestResult {
        self.add_account(Account::new("carol", "carol").teacher()).await?;
        self.add_account(Account::new("alice", "alice")).await?;
        self.add_account(Account::new("bob", "bob")).await
    }

    pub async fn create_classroom(&self, classroom: Classroom) -> Result<Classroom, String> {
        ObjectStore::<Classroom>::create(self.store.as_ref(), classroom)
            .await
            .map_err(ctx("creating classroom"))
    }

    pub async fn account(&self, name: &str) -> Result<Account, String> {
        ObjectStore::<Account>::get(self.store.as_ref(), name)
            .await
            .map_err(ctx("reading account"))?
            .ok_or_else(|| format!("account {name} is missing"))
    }

    /// Read, edit and write back an account's spec.
    pub async fn edit_account(&self, name: &str, edit: impl FnOnce(&mut Account)) -> TestResult {
        let mut account = self.account(name).await?;
        edit(&mut account);
        ObjectStore::<Account>::update(self.store.as_ref(), &account)
            .await
            .map_err(ctx("updating account"))?;
        Ok(())
    }

    pub async fn classroom(&self, name: &str) -> Result<Option<Classroom>, String> {
        ObjectStore::<Classroom>::get(self.store.as_ref(), name)
            .await
            .map_err(ctx("reading classroom"))
    }

    /// Read, edit and write back a classroom's spec.
    pub async fn edit_classroom(&self, name: &str, edit: impl FnOnce(&mut Classroom)) -> TestResult {
        let mut classroom = self
            .classroom(name)
            .await?
            .ok_or_else(|| format!("classroom {name} is missing"))?;
        edit(&mut classroom);
        ObjectStore::<Classroom>::update(self.store.as_ref(), &classroom)
            .await
            .map_err(ctx("updating classroom"))?;
        Ok(())
    }

    pub async fn child(&self, key: &ChildKey) -> Result<Option<LiveChild>, String> {
        ChildStore::get(self.store.as_ref(), key).await.map_err(ctx("reading child"))
    }

    pub async fn owned(&self, kind: ChildKind, owner_uid: &str) -> Result<Vec<LiveChild>, String> {
        ChildStore::list_owned(self.store.as_ref(), kind, owner_uid)
            .await
            .map_err(ctx("listing owned children"))
    }

    pub async fn journal_len(&self) -> Result<usize, String> {
        self.journal.count().await.map_err(ctx("counting journal"))
    }
}

pub fn workload(namespace: &str, name: &str) -> ChildKey {
    ChildKey::namespaced(ChildKind::Workload, namespace, name)
}

pub fn namespace(name: &str) -> ChildKey {
    ChildKey::cluster(ChildKind::Namespace, name)
}
