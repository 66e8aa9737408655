//! Account reconciliation from creation to deletion.
//!
//! Covers:
//! - Provisioning of the namespace, access role, binding, home mount and claim
//! - Idempotence: a converged account produces no further writes
//! - Deletion: the namespace is removed explicitly, everything else by owner GC
//! - Id edits: the namespace the account claimed under its old id is released

mod common;

use std::time::Duration;

use common::{Harness, TestResult, check, converge, ctx, first_error, namespace, workload};
use kubelab_reconciler::api::find_condition;
use kubelab_reconciler::children::render::{HOME_MOUNT, USER_CLAIM, USER_ROLE, USER_ROLE_BINDING};
use kubelab_reconciler::{
    Account, ChildKey, ChildKind, ChildSpec, ConditionKind, ConditionStatus, Managed, ObjectStore, ReconcilerConfig,
};

#[tokio::test]
async fn account_converges_to_its_children() -> TestResult {
    let harness = Harness::new();
    harness.add_account(Account::new("alice", "s-alice")).await?;

    check(harness.child(&namespace("s-alice")).await?.is_some(), "namespace missing")?;
    for (kind, name) in [
        (ChildKind::Role, USER_ROLE),
        (ChildKind::RoleBinding, USER_ROLE_BINDING),
        (ChildKind::Workload, HOME_MOUNT),
        (ChildKind::StorageClaim, USER_CLAIM),
    ] {
        let key = ChildKey::namespaced(kind, "s-alice", name);
        check(harness.child(&key).await?.is_some(), format!("{key} missing"))?;
    }
    check(harness.store.child_count().await == 5, "unexpected extra children")?;

    let binding = harness
        .child(&ChildKey::namespaced(ChildKind::RoleBinding, "s-alice", USER_ROLE_BINDING))
        .await?
        .ok_or("binding missing")?;
    match binding.spec {
        ChildSpec::RoleBinding(spec) => check(spec.subject_name == "kubelab:s-alice", "binding subject")?,
        other => return Err(format!("unexpected binding spec {other:?}")),
    }

    let alice = harness.account("alice").await?;
    check(alice.status.mount_name == HOME_MOUNT, "mount name not reported")?;
    check(alice.metadata.has_finalizer(Account::FINALIZER), "finalizer missing")?;
    let available = find_condition(&alice.status.conditions, ConditionKind::Available).ok_or("no Available")?;
    check(available.status == ConditionStatus::True, "account not available")
}

#[tokio::test]
async fn converged_account_is_not_rewritten() -> TestResult {
    let harness = Harness::new();
    harness.add_account(Account::new("alice", "alice")).await?;

    let before = harness.journal_len().await?;
    let version = harness.account("alice").await?.metadata.resource_version;
    for _ in 0..3 {
        check(converge(&harness.accounts, "alice").await? == 1, "converged account needed extra passes")?;
    }
    check(harness.journal_len().await? == before, "converged passes produced writes")?;
    check(
        harness.account("alice").await?.metadata.resource_version == version,
        "resource version moved",
    )
}

#[tokio::test]
async fn deleted_account_takes_its_children_along() -> TestResult {
    let harness = Harness::new();
    harness.add_account(Account::new("alice", "alice")).await?;
    harness.add_account(Account::new("bob", "bob")).await?;

    ObjectStore::<Account>::delete(harness.store.as_ref(), "alice")
        .await
        .map_err(ctx("deleting account"))?;
    converge(&harness.accounts, "alice").await?;

    check(
        ObjectStore::<Account>::get(harness.store.as_ref(), "alice")
            .await
            .map_err(ctx("reading account"))?
            .is_none(),
        "account still stored",
    )?;
    check(harness.child(&namespace("alice")).await?.is_none(), "namespace survived")?;
    check(harness.child(&workload("alice", HOME_MOUNT)).await?.is_none(), "home mount survived")?;
    check(harness.child(&namespace("bob")).await?.is_some(), "other account affected")?;
    check(harness.store.child_count().await == 5, "unexpected children left")
}

#[tokio::test]
async fn editing_the_id_moves_the_namespace_and_deletion_cleans_both() -> TestResult {
    let harness = Harness::new();
    harness.add_account(Account::new("alice", "s1")).await?;

    harness.edit_account("alice", |alice| alice.spec.id = "s2".into()).await?;
    converge(&harness.accounts, "alice").await?;
    check(harness.child(&namespace("s1")).await?.is_none(), "old namespace kept after the edit")?;
    check(harness.child(&namespace("s2")).await?.is_some(), "new namespace missing")?;
    check(harness.store.child_count().await == 5, "old namespace contents left behind")?;

    ObjectStore::<Account>::delete(harness.store.as_ref(), "alice")
        .await
        .map_err(ctx("deleting account"))?;
    converge(&harness.accounts, "alice").await?;

    check(
        ObjectStore::<Account>::get(harness.store.as_ref(), "alice")
            .await
            .map_err(ctx("reading account"))?
            .is_none(),
        "account still stored",
    )?;
    check(harness.child(&namespace("s1")).await?.is_none(), "namespace s1 survived")?;
    check(harness.child(&namespace("s2")).await?.is_none(), "namespace s2 survived")?;
    check(harness.store.child_count().await == 0, "children left after deletion")
}

#[tokio::test]
async fn deleted_children_are_recreated() -> TestResult {
    let harness = Harness::new();
    harness.add_account(Account::new("alice", "alice")).await?;

    let mount = workload("alice", HOME_MOUNT);
    kubelab_reconciler::ChildStore::delete(harness.store.as_ref(), &mount)
        .await
        .map_err(ctx("deleting mount"))?;
    converge(&harness.accounts, "alice").await?;
    check(harness.child(&mount).await?.is_some(), "home mount not recreated")
}

#[tokio::test]
async fn invalid_identifier_provisions_nothing() -> TestResult {
    let harness = Harness::new();
    ObjectStore::<Account>::create(harness.store.as_ref(), Account::new("mallory", "Mallory_01"))
        .await
        .map_err(ctx("creating account"))?;

    check(first_error(&harness.accounts, "mallory").await? == "validation", "expected validation failure")?;
    check(harness.store.child_count().await == 0, "children created for invalid account")?;
    let mallory = harness.account("mallory").await?;
    let available = find_condition(&mallory.status.conditions, ConditionKind::Available).ok_or("no Available")?;
    check(available.status == ConditionStatus::False, "invalid account reported available")
}

#[tokio::test]
async fn duplicate_identifier_is_rejected_for_the_newer_account() -> TestResult {
    let harness = Harness::new();
    harness.add_account(Account::new("alice", "shared")).await?;
    // Object uids order by creation time at millisecond resolution.
    tokio::time::sleep(Duration::from_millis(5)).await;

    ObjectStore::<Account>::create(harness.store.as_ref(), Account::new("impostor", "shared"))
        .await
        .map_err(ctx("creating account"))?;
    harness.refresh_registry().await?;

    check(
        first_error(&harness.accounts, "impostor").await? == "validation",
        "duplicate id accepted",
    )?;
    check(converge(&harness.accounts, "alice").await? == 1, "original owner disturbed")
}

#[tokio::test]
async fn status_write_conflicts_are_retried_within_the_pass() -> TestResult {
    let harness = Harness::with_config(ReconcilerConfig {
        conflict_retries: 2,
        password_hash_cost: 4,
        ..ReconcilerConfig::default()
    });
    ObjectStore::<Account>::create(harness.store.as_ref(), Account::new("alice", "alice"))
        .await
        .map_err(ctx("creating account"))?;
    harness
        .store
        .inject_fault(kubelab_reconciler::Fault::conflict(
            kubelab_reconciler::Operation::UpdateStatus,
            Account::KIND,
        ))
        .await;

    converge(&harness.accounts, "alice").await?;
    check(harness.store.child_count().await == 5, "account did not converge")
}
