//! Event-driven dispatcher that feeds a reconciler from the watch stream.

pub mod queue;

use std::sync::Arc;

use futures::future::join_all;
use kubelab_events::{EventBus, EventPattern, EventSubscription, WatchEvent};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ReconcileError;
use crate::managed::Managed;
use crate::reconciler::{Action, Reconciler};

pub use queue::WorkQueue;

/// Where a watch event should be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Reconcile one object of the controller's kind.
    Object(String),
    /// A related kind changed; reconcile every object.
    Everything,
    Ignore,
}

/// Map a watch event to the objects it concerns.
///
/// Events for the kind itself go to the object, events for children go to
/// their owner.
pub fn route<O: Managed>(event: &WatchEvent) -> Route {
    if event.kind() == O::KIND {
        return Route::Object(event.object().name.clone());
    }
    if let Some(owner) = event.owner().filter(|owner| owner.kind == O::KIND) {
        return Route::Object(owner.name.clone());
    }
    if O::RELATED_KINDS.iter().any(|kind| *kind == event.kind()) {
        return Route::Everything;
    }
    Route::Ignore
}

/// Runs a reconciler for every object of one kind.
pub struct Controller<O: Managed> {
    reconciler: Arc<Reconciler<O>>,
    bus: Arc<EventBus>,
    queue: Arc<WorkQueue>,
}

impl<O: Managed> Controller<O> {
    pub fn new(reconciler: Arc<Reconciler<O>>, bus: Arc<EventBus>) -> Self {
        Self {
            reconciler,
            bus,
            queue: Arc::new(WorkQueue::new()),
        }
    }

    /// Subscribe to the watch stream, enqueue every existing object and
    /// spawn the workers.
    pub async fn start(self) -> ControllerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (subscriber_id, subscription) = self.bus.subscribe_with_pattern(EventPattern::All).await;
        enqueue_all(&self.reconciler, &self.queue).await;

        let config = self.reconciler.config().clone();
        let mut tasks = Vec::with_capacity(config.workers.saturating_add(2));

        tasks.push(tokio::spawn(follow_events(
            Arc::clone(&self.reconciler),
            Arc::clone(&self.queue),
            subscription,
            stop_rx.clone(),
        )));
        tasks.push(tokio::spawn(resync(
            Arc::clone(&self.reconciler),
            Arc::clone(&self.queue),
            stop_rx,
        )));
        for worker in 0..config.workers {
            tasks.push(tokio::spawn(run_worker(
                worker,
                Arc::clone(&self.reconciler),
                Arc::clone(&self.queue),
            )));
        }

        info!(kind = O::KIND, workers = config.workers, "Controller started");
        ControllerHandle {
            kind: O::KIND,
            stop_tx,
            queue: self.queue,
            bus: self.bus,
            subscriber_id,
            tasks,
        }
    }
}

/// Handle for stopping a running controller.
pub struct ControllerHandle {
    kind: &'static str,
    stop_tx: watch::Sender<bool>,
    queue: Arc<WorkQueue>,
    bus: Arc<EventBus>,
    subscriber_id: String,
    tasks: Vec<JoinHandle<()>>,
}

impl ControllerHandle {
    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Stop taking work and wait for in-flight passes to finish.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        self.queue.shutdown().await;
        self.bus.unsubscribe(&self.subscriber_id).await;
        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                warn!(kind = self.kind, error = %e, "Controller task ended abnormally");
            }
        }
        info!(kind = self.kind, "Controller stopped");
    }
}

async fn enqueue_all<O: Managed>(reconciler: &Reconciler<O>, queue: &WorkQueue) {
    match reconciler.objects().list().await {
        Ok(objects) => {
            debug!(kind = O::KIND, count = objects.len(), "Enqueueing all objects");
            for object in objects {
                queue.add(object.name()).await;
            }
        }
        Err(e) => warn!(kind = O::KIND, error = %e, "Listing objects failed"),
    }
}

async fn dispatch<O: Managed>(reconciler: &Reconciler<O>, queue: &WorkQueue, event: &WatchEvent) {
    match route::<O>(event) {
        Route::Object(name) => queue.add(name).await,
        Route::Everything => {
            // Refresh the index before the passes that read it.
            if let Err(e) = reconciler.registry().apply_event(event) {
                warn!(object = %event.object(), error = %e, "Ignoring malformed related event");
            }
            enqueue_all(reconciler, queue).await;
        }
        Route::Ignore => {}
    }
}

async fn follow_events<O: Managed>(
    reconciler: Arc<Reconciler<O>>,
    queue: Arc<WorkQueue>,
    mut subscription: EventSubscription,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Ok(event) => dispatch(&reconciler, &queue, &event).await,
                Err(kubelab_events::Error::Lagged { skipped }) => {
                    warn!(kind = O::KIND, skipped, "Watch stream lagged, enqueueing everything");
                    enqueue_all(&reconciler, &queue).await;
                }
                Err(e) => {
                    debug!(kind = O::KIND, error = %e, "Watch stream ended");
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

async fn resync<O: Managed>(reconciler: Arc<Reconciler<O>>, queue: Arc<WorkQueue>, mut shutdown: watch::Receiver<bool>) {
    let period = reconciler.config().resync_period();
    if period.is_zero() {
        return;
    }
    let mut ticker = tokio::time::interval(period);
    ticker.reset();
    loop {
        tokio::select! {
            _ = ticker.tick() => enqueue_all(&reconciler, &queue).await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn run_worker<O: Managed>(worker: usize, reconciler: Arc<Reconciler<O>>, queue: Arc<WorkQueue>) {
    while let Some(name) = queue.next().await {
        let config = reconciler.config();
        let result = tokio::time::timeout(config.pass_timeout(), reconciler.reconcile(&name))
            .await
            .unwrap_or(Err(ReconcileError::Timeout {
                secs: config.pass_timeout_secs,
            }));

        match result {
            Ok(Action::Requeue(delay)) => queue.add_after(name.as_str(), delay).await,
            Ok(Action::AwaitChange) => {}
            Err(e) => {
                let delay = config.backoff_for(&e);
                warn!(
                    worker,
                    kind = O::KIND,
                    name = %name,
                    category = e.category(),
                    error = %e,
                    retry_in = ?delay,
                    "Pass failed"
                );
                queue.add_after(name.as_str(), delay).await;
            }
        }
        queue.done(&name).await;
    }
    debug!(worker, kind = O::KIND, "Worker stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use kubelab_events::{ObjectRef, OwnerRef};
    use serde_json::json;

    use super::*;
    use crate::api::{Account, Classroom};

    #[test]
    fn test_own_kind_routes_to_object() {
        let event = WatchEvent::applied(ObjectRef::cluster("Classroom", "networks"), json!({}));
        assert_eq!(route::<Classroom>(&event), Route::Object("networks".into()));
    }

    #[test]
    fn test_owned_child_routes_to_owner() {
        let event = WatchEvent::deleted(ObjectRef::namespaced("Workload", "alice", "networks"), json!({}))
            .with_owner(Some(OwnerRef::new("Classroom", "networks", "u1")));
        assert_eq!(route::<Classroom>(&event), Route::Object("networks".into()));
        assert_eq!(route::<Account>(&event), Route::Ignore);
    }

    #[test]
    fn test_related_kind_routes_everywhere() {
        let event = WatchEvent::applied(ObjectRef::cluster("KubelabUser", "alice"), json!({}));
        assert_eq!(route::<Classroom>(&event), Route::Everything);
        assert_eq!(route::<Account>(&event), Route::Object("alice".into()));
    }

    #[test]
    fn test_unowned_child_is_ignored() {
        let event = WatchEvent::applied(ObjectRef::cluster("Namespace", "alice"), json!({}));
        assert_eq!(route::<Classroom>(&event), Route::Ignore);
        assert_eq!(route::<Account>(&event), Route::Ignore);
    }
}
