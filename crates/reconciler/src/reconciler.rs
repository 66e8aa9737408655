//! The generic reconcile loop shared by every managed kind.

use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::ReconcilerConfig;
use crate::drift::{DriftCorrector, DriftOutcome};
use crate::ensure::{EnsureOutcome, ReleaseOutcome, ResourceEnsurer};
use crate::error::{ReconcileError, Result};
use crate::finalizer::{FinalizationCoordinator, FinalizeOutcome};
use crate::managed::Managed;
use crate::membership::{MembershipOutcome, MembershipReconciler};
use crate::plan::Plan;
use crate::registry::RegistryIndex;
use crate::status::{self, PassOutcome};
use crate::store::{ChildStore, ObjectStore};

/// What the dispatcher should do after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Run another pass after the delay.
    Requeue(Duration),
    /// Nothing left to do until something changes.
    AwaitChange,
}

impl Action {
    pub const fn requeue_now() -> Self {
        Self::Requeue(Duration::ZERO)
    }
}

/// K8s-style reconciler for one managed kind.
///
/// A pass performs at most one mutation and then returns, so every
/// decision is taken against freshly read state.
pub struct Reconciler<O: Managed> {
    objects: Arc<dyn ObjectStore<O>>,
    registry: Arc<RegistryIndex>,
    config: Arc<ReconcilerConfig>,
    ensurer: ResourceEnsurer,
    drift: DriftCorrector,
    membership: MembershipReconciler,
    finalizer: FinalizationCoordinator,
}

impl<O: Managed> Reconciler<O> {
    pub fn new(
        objects: Arc<dyn ObjectStore<O>>,
        children: Arc<dyn ChildStore>,
        registry: Arc<RegistryIndex>,
        config: Arc<ReconcilerConfig>,
    ) -> Self {
        Self {
            objects,
            registry,
            config,
            ensurer: ResourceEnsurer::new(children.clone()),
            drift: DriftCorrector::new(children.clone()),
            membership: MembershipReconciler::new(children.clone()),
            finalizer: FinalizationCoordinator::new(children),
        }
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore<O>> {
        &self.objects
    }

    pub fn registry(&self) -> &Arc<RegistryIndex> {
        &self.registry
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Run one pass for the named object.
    ///
    /// Write conflicts restart the pass from a fresh read, up to the
    /// configured number of times, and are never returned.
    ///
    /// # Errors
    ///
    /// Returns validation, provisioning, finalization and store failures
    /// after recording them in the object's status where possible.
    pub async fn reconcile(&self, name: &str) -> Result<Action> {
        let span = info_span!("reconcile", kind = O::KIND, name);
        async {
            let mut conflicts = 0u32;
            loop {
                match self.pass(name).await {
                    Err(e) if e.is_conflict() => {
                        if conflicts >= self.config.conflict_retries {
                            debug!(conflicts, "Conflicts persisted, requeueing");
                            return Ok(Action::requeue_now());
                        }
                        conflicts = conflicts.saturating_add(1);
                        debug!(error = %e, attempt = conflicts, "Write conflict, restarting pass");
                    }
                    other => return other,
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn pass(&self, name: &str) -> Result<Action> {
        let fetched = self
            .objects
            .get(name)
            .await
            .map_err(|e| ReconcileError::from_object("get", format!("{}/{name}", O::KIND), e))?;
        let Some(mut object) = fetched else {
            debug!("Object not found, nothing to do");
            return Ok(Action::AwaitChange);
        };

        if object.conditions().is_empty() {
            status::project(&mut object, &PassOutcome::Initializing);
            self.write_status(&object).await?;
            return Ok(Action::requeue_now());
        }

        if object.meta().is_being_deleted() {
            return self.finalize(object).await;
        }

        if object.meta_mut().add_finalizer(O::FINALIZER) {
            self.objects
                .update(&object)
                .await
                .map_err(|e| ReconcileError::from_object("add_finalizer", object.object_ref().to_string(), e))?;
            info!("Finalizer added");
            return Ok(Action::requeue_now());
        }

        let resolved = match object.validate(&self.registry) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(error = %e, "Validation failed");
                if status::project(&mut object, &PassOutcome::InvalidReference(e.to_string())) {
                    self.write_status(&object).await?;
                }
                return Err(e.into());
            }
        };

        let plan = match object.render(&resolved, &self.config) {
            Ok(plan) => plan,
            Err(e) => return self.degrade(object, e).await,
        };
        match self.converge(&object, &plan).await {
            Ok(Some(action)) => return Ok(action),
            Ok(None) => {}
            Err(e) => return self.degrade(object, e).await,
        }

        if status::is_degraded(&object) {
            status::project(&mut object, &PassOutcome::Recovered);
            self.write_status(&object).await?;
            info!("Recovered from earlier failure");
            return Ok(Action::requeue_now());
        }

        let summary_changed = object.project_summary(&plan);
        let condition_changed = status::project(&mut object, &PassOutcome::Converged);
        if summary_changed || condition_changed {
            self.write_status(&object).await?;
            info!(children = plan.len(), "Converged");
        } else {
            debug!("Already converged");
        }
        Ok(Action::AwaitChange)
    }

    /// Walk the plan and perform the first mutation it calls for.
    ///
    /// Returns `None` when everything already matches.
    async fn converge(&self, object: &O, plan: &Plan) -> Result<Option<Action>> {
        let mut existing = Vec::with_capacity(plan.len());
        for step in plan.steps() {
            let outcome = self.ensurer.ensure(step).await?;
            if outcome.mutated() {
                return Ok(Some(Action::Requeue(self.config.create_requeue())));
            }
            if let EnsureOutcome::Exists(live) = outcome {
                existing.push((step, live));
            }
        }

        for (step, live) in &existing {
            if let DriftOutcome::Corrected(_) = self.drift.correct(step, live).await? {
                return Ok(Some(Action::requeue_now()));
            }
        }

        if let ReleaseOutcome::Released(_) = self.ensurer.release_stale(&object.meta().uid, plan).await? {
            return Ok(Some(Action::requeue_now()));
        }

        if let Some(declared) = object.membership() {
            if let MembershipOutcome::Removed(_) = self.membership.reconcile(&object.meta().uid, &declared).await? {
                return Ok(Some(Action::requeue_now()));
            }
        }
        Ok(None)
    }

    async fn finalize(&self, mut object: O) -> Result<Action> {
        if !object.meta().has_finalizer(O::FINALIZER) {
            debug!("Deletion pending on other finalizers");
            return Ok(Action::AwaitChange);
        }

        if !status::finalization_announced(&object) {
            status::project(&mut object, &PassOutcome::Finalizing);
            self.write_status(&object).await?;
            return Ok(Action::requeue_now());
        }

        match self.finalizer.finalize(&object, self.objects.as_ref()).await? {
            FinalizeOutcome::Done => Ok(Action::AwaitChange),
            FinalizeOutcome::Retry { resource, reason } => {
                let message = format!("Failed to delete {resource}: {reason}");
                if status::project(&mut object, &PassOutcome::FinalizeFailed(message)) {
                    if let Err(e) = self.write_status(&object).await {
                        warn!(error = %e, "Failed to record finalization failure");
                    }
                }
                Err(ReconcileError::finalization(resource, reason))
            }
        }
    }

    /// Record a failed pass as Degraded and hand the error back.
    async fn degrade(&self, mut object: O, error: ReconcileError) -> Result<Action> {
        if error.is_conflict() {
            return Err(error);
        }
        warn!(error = %error, category = error.category(), "Reconcile pass failed");
        if status::project(&mut object, &PassOutcome::ProvisioningFailed(error.to_string())) {
            if let Err(e) = self.write_status(&object).await {
                warn!(error = %e, "Failed to record degraded status");
            }
        }
        Err(error)
    }

    async fn write_status(&self, object: &O) -> Result<O> {
        self.objects
            .update_status(object)
            .await
            .map_err(|e| ReconcileError::from_object("update_status", object.object_ref().to_string(), e))
    }
}
