//! Registry index: business id to account lookups, kept current from watch events.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use kubelab_events::{EventBus, EventPattern, EventSubscription, WatchEvent};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::Account;
use crate::error::StoreResult;
use crate::managed::Managed;
use crate::store::ObjectStore;

/// Role an account plays in classrooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Privileged,
    Ordinary,
}

/// Index entry for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryRecord {
    /// Object name of the account.
    pub name: String,
    pub uid: String,
    pub business_id: String,
    pub role: Role,
}

impl From<&Account> for RegistryRecord {
    fn from(account: &Account) -> Self {
        Self {
            name: account.metadata.name.clone(),
            uid: account.metadata.uid.clone(),
            business_id: account.spec.id.clone(),
            role: if account.spec.is_teacher {
                Role::Privileged
            } else {
                Role::Ordinary
            },
        }
    }
}

#[derive(Debug, Default)]
struct IndexState {
    /// Claimants per business id, keyed by uid so the oldest claimant sorts first.
    by_business_id: HashMap<String, BTreeMap<String, RegistryRecord>>,
    /// Business id currently held by each account name.
    id_by_name: HashMap<String, String>,
}

impl IndexState {
    fn remove_name(&mut self, name: &str) {
        let Some(id) = self.id_by_name.remove(name) else {
            return;
        };
        if let Some(claimants) = self.by_business_id.get_mut(&id) {
            claimants.retain(|_, record| record.name != name);
            if claimants.is_empty() {
                self.by_business_id.remove(&id);
            }
        }
    }

    fn insert(&mut self, record: RegistryRecord) {
        self.remove_name(&record.name);
        self.id_by_name.insert(record.name.clone(), record.business_id.clone());
        self.by_business_id
            .entry(record.business_id.clone())
            .or_default()
            .insert(record.uid.clone(), record);
    }
}

/// Read-mostly index from business identifier to account.
///
/// Lookups never touch the store. When two accounts claim the same id the
/// oldest one wins.
#[derive(Debug, Default)]
pub struct RegistryIndex {
    state: RwLock<IndexState>,
}

impl RegistryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the account holding a business id.
    pub fn resolve(&self, business_id: &str) -> Option<RegistryRecord> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .by_business_id
            .get(business_id)
            .and_then(|claimants| claimants.values().next())
            .cloned()
    }

    /// Insert or replace the entry for an account.
    pub fn apply(&self, record: RegistryRecord) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.insert(record);
    }

    /// Drop the entry for an account name.
    pub fn remove(&self, name: &str) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.remove_name(name);
    }

    /// Replace the whole index.
    pub fn replace_all(&self, records: impl IntoIterator<Item = RegistryRecord>) {
        let mut fresh = IndexState::default();
        for record in records {
            fresh.insert(record);
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = fresh;
    }

    /// Number of indexed accounts.
    pub fn len(&self) -> usize {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.id_by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply an account watch event.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the event body is not an account.
    pub fn apply_event(&self, event: &WatchEvent) -> StoreResult<()> {
        if event.kind() != Account::KIND {
            return Ok(());
        }
        if event.is_deletion() {
            self.remove(&event.object().name);
            return Ok(());
        }
        let account: Account = serde_json::from_value(event.body().clone())?;
        self.apply(RegistryRecord::from(&account));
        Ok(())
    }
}

/// Keeps a registry index in sync with the stored accounts.
pub struct RegistryWatcher {
    index: Arc<RegistryIndex>,
    accounts: Arc<dyn ObjectStore<Account>>,
    bus: Arc<EventBus>,
}

impl RegistryWatcher {
    pub fn new(index: Arc<RegistryIndex>, accounts: Arc<dyn ObjectStore<Account>>, bus: Arc<EventBus>) -> Self {
        Self { index, accounts, bus }
    }

    /// Rebuild the index from a full listing.
    ///
    /// # Errors
    ///
    /// Returns the store error if listing accounts fails.
    pub async fn prime(&self) -> StoreResult<usize> {
        let accounts = self.accounts.list().await?;
        self.index.replace_all(accounts.iter().map(RegistryRecord::from));
        info!(accounts = accounts.len(), "Registry index primed");
        Ok(accounts.len())
    }

    /// Subscribe, prime, then follow account events until shutdown.
    ///
    /// The subscription is taken before priming so no change falls between
    /// the listing and the first event.
    ///
    /// # Errors
    ///
    /// Returns the store error if the initial listing fails.
    pub async fn start(self, shutdown: watch::Receiver<bool>) -> StoreResult<JoinHandle<()>> {
        let (subscriber_id, subscription) = self
            .bus
            .subscribe_with_pattern(EventPattern::ByKind(Account::KIND.to_string()))
            .await;
        self.prime().await?;
        Ok(tokio::spawn(async move {
            self.follow(subscription, shutdown).await;
            self.bus.unsubscribe(&subscriber_id).await;
        }))
    }

    async fn follow(&self, mut subscription: EventSubscription, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                event = subscription.recv() => match event {
                    Ok(event) => {
                        if let Err(e) = self.index.apply_event(&event) {
                            warn!(object = %event.object(), error = %e, "Ignoring malformed account event");
                        }
                    }
                    Err(kubelab_events::Error::Lagged { skipped }) => {
                        warn!(skipped, "Registry watcher lagged, relisting accounts");
                        if let Err(e) = self.prime().await {
                            warn!(error = %e, "Relisting accounts failed");
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Account event stream ended");
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
