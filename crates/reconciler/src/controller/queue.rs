//! Keyed work queue with per-key serialization.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<String>,
    /// Keys currently in `ready`.
    queued: HashSet<String>,
    /// Keys a worker is processing.
    active: HashSet<String>,
    /// Active keys requested again while being processed.
    dirty: HashSet<String>,
    shutdown: bool,
}

/// Hands out object names to workers.
///
/// A key is never given to two workers at once, and a key requested any
/// number of times while waiting is processed once. A key requested while
/// active is processed again after the current pass finishes.
#[derive(Debug, Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, key: impl Into<String>) {
        let key = key.into();
        let mut state = self.state.lock().await;
        if state.shutdown {
            return;
        }
        if state.active.contains(&key) {
            state.dirty.insert(key);
            return;
        }
        if state.queued.insert(key.clone()) {
            state.ready.push_back(key);
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Add `key` once `delay` has elapsed.
    pub async fn add_after(self: &Arc<Self>, key: impl Into<String>, delay: Duration) {
        let key = key.into();
        if delay.is_zero() {
            self.add(key).await;
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key).await;
        });
    }

    /// Wait for the next key. Returns `None` after shutdown.
    ///
    /// The caller must hand the key back with [`WorkQueue::done`].
    pub async fn next(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.state.lock().await;
                if state.shutdown {
                    return None;
                }
                if let Some(key) = state.ready.pop_front() {
                    state.queued.remove(&key);
                    state.active.insert(key.clone());
                    return Some(key);
                }
            }
            notified.await;
        }
    }

    /// Release a key taken with [`WorkQueue::next`].
    pub async fn done(&self, key: &str) {
        let mut state = self.state.lock().await;
        state.active.remove(key);
        if state.dirty.remove(key) && !state.shutdown && state.queued.insert(key.to_string()) {
            state.ready.push_back(key.to_string());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Stop handing out keys and wake every waiting worker.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.shutdown = true;
        state.ready.clear();
        state.queued.clear();
        state.dirty.clear();
        drop(state);
        self.notify.notify_waiters();
    }

    /// Keys waiting to be handed out.
    pub async fn len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_adds_collapse() {
        let queue = WorkQueue::new();
        queue.add("alice").await;
        queue.add("alice").await;
        queue.add("bob").await;
        assert_eq!(queue.len().await, 2);

        assert_eq!(queue.next().await.as_deref(), Some("alice"));
        assert_eq!(queue.next().await.as_deref(), Some("bob"));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_active_key_is_not_handed_out_twice() {
        let queue = WorkQueue::new();
        queue.add("alice").await;
        let key = queue.next().await.unwrap();

        queue.add("alice").await;
        assert!(queue.is_empty().await);

        queue.done(&key).await;
        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.next().await.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_done_without_new_request_drops_key() {
        let queue = WorkQueue::new();
        queue.add("alice").await;
        let key = queue.next().await.unwrap();
        queue.done(&key).await;
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_shutdown_releases_waiting_workers() {
        let queue = Arc::new(WorkQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next().await })
        };
        tokio::task::yield_now().await;
        queue.shutdown().await;
        assert_eq!(waiter.await.unwrap(), None);

        queue.add("alice").await;
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_waiting_worker_wakes_on_add() {
        let queue = Arc::new(WorkQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next().await })
        };
        tokio::task::yield_now().await;
        queue.add("alice").await;
        assert_eq!(waiter.await.unwrap().as_deref(), Some("alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_after_waits_for_delay() {
        let queue = Arc::new(WorkQueue::new());
        queue.add_after("alice", Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert!(queue.is_empty().await);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(queue.len().await, 1);
    }
}
