//! Shared access to an [`ObjectStatusMap`] for concurrent sync workers.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use synctrack_core::ResourceId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::report::StatusLogger;
use crate::status::{ActuationStatus, ActuationStrategy, ObjectStatus, ObjectStatusMap, ReconcileStatus};

/// Cloneable handle to one pass's status map behind a single lock.
///
/// Writers for different ids may run concurrently. Each id should still have a
/// single writer; the lock orders updates but does not arbitrate between two
/// workers racing on the same object. Reads and reports see whatever has landed
/// so far, so report only once the pass is quiescent.
#[derive(Debug, Clone, Default)]
pub struct StatusTracker {
    inner: Arc<RwLock<ObjectStatusMap>>,
}

impl StatusTracker {
    pub fn new() -> Self { Self::default() }

    // Every mutation is a single insert or clear, so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, ObjectStatusMap> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ObjectStatusMap> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, id: ResourceId, status: Option<ObjectStatus>) {
        self.write().set(id, status);
    }

    pub fn get(&self, id: &ResourceId) -> Option<ObjectStatus> { self.read().get(id) }

    pub fn len(&self) -> usize { self.read().len() }
    pub fn is_empty(&self) -> bool { self.read().is_empty() }

    pub fn filter(
        &self,
        strategy: Option<ActuationStrategy>,
        actuation: Option<ActuationStatus>,
        reconcile: Option<ReconcileStatus>,
    ) -> Vec<ResourceId> {
        self.read().filter(strategy, actuation, reconcile)
    }

    /// Owned copy of the map as of now.
    pub fn snapshot(&self) -> ObjectStatusMap { self.read().clone() }

    /// Log all reports from a snapshot, so writers are not blocked while formatting.
    pub fn log<L: StatusLogger + ?Sized>(&self, logger: &L) {
        if !logger.enabled() {
            return;
        }
        self.snapshot().emit(logger);
    }

    pub fn reset(&self) {
        let mut map = self.write();
        debug!(entries = map.len(), "resetting object status map");
        map.reset();
    }
}

/// One observed state transition, as sent by an actuation worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub id: ResourceId,
    pub status: Option<ObjectStatus>,
}

impl StatusUpdate {
    pub fn new(id: ResourceId, status: ObjectStatus) -> Self {
        Self { id, status: Some(status) }
    }
}

/// Spawn a task that applies updates in arrival order. The join handle yields
/// the number of updates applied once every sender is dropped.
pub fn spawn_recorder(cap: usize) -> (mpsc::Sender<StatusUpdate>, StatusTracker, JoinHandle<u64>) {
    let (tx, mut rx) = mpsc::channel::<StatusUpdate>(cap.max(1));
    let tracker = StatusTracker::new();
    let sink = tracker.clone();
    let handle = tokio::spawn(async move {
        let mut applied = 0u64;
        while let Some(update) = rx.recv().await {
            sink.set(update.id, update.status);
            applied += 1;
        }
        debug!(applied, "status channel closed; recorder exiting");
        applied
    });
    (tx, tracker, handle)
}

/// [`spawn_recorder`] with capacity from `SYNCTRACK_RECORDER_CAP`.
pub fn spawn_recorder_default() -> (mpsc::Sender<StatusUpdate>, StatusTracker, JoinHandle<u64>) {
    spawn_recorder(crate::recorder_capacity())
}

#[cfg(test)]
mod tests {
    use super::*;
    use synctrack_core::GroupKind;

    fn cm(n: usize) -> ResourceId {
        ResourceId::new(GroupKind::new("", "ConfigMap"), "default", format!("cm-{n}"))
    }

    #[test]
    fn concurrent_writers_on_distinct_ids() {
        let tracker = StatusTracker::new();
        std::thread::scope(|s| {
            for w in 0..4 {
                let t = tracker.clone();
                s.spawn(move || {
                    for i in 0..50 {
                        let id = cm(w * 50 + i);
                        t.set(id.clone(), Some(ObjectStatus::pending(ActuationStrategy::Apply)));
                        t.set(
                            id,
                            Some(ObjectStatus::new(ActuationStrategy::Apply, ActuationStatus::Succeeded, ReconcileStatus::Succeeded)),
                        );
                    }
                });
            }
        });
        assert_eq!(tracker.len(), 200);
        assert_eq!(tracker.filter(None, Some(ActuationStatus::Succeeded), None).len(), 200);
        assert!(tracker.filter(None, Some(ActuationStatus::Pending), None).is_empty());
    }

    #[test]
    fn snapshot_is_detached() {
        let tracker = StatusTracker::new();
        tracker.set(cm(1), Some(ObjectStatus::pending(ActuationStrategy::Delete)));
        let snap = tracker.snapshot();
        tracker.reset();
        assert!(tracker.is_empty());
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get(&cm(1)), Some(ObjectStatus::pending(ActuationStrategy::Delete)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn recorder_applies_updates_in_order() {
        let (tx, tracker, handle) = spawn_recorder(8);
        let id = cm(7);
        tx.send(StatusUpdate::new(id.clone(), ObjectStatus::pending(ActuationStrategy::Apply))).await.unwrap();
        tx.send(StatusUpdate::new(
            id.clone(),
            ObjectStatus::new(ActuationStrategy::Apply, ActuationStatus::Failed, ReconcileStatus::Skipped),
        ))
        .await
        .unwrap();
        drop(tx);
        assert_eq!(handle.await.unwrap(), 2);
        assert_eq!(
            tracker.get(&id),
            Some(ObjectStatus::new(ActuationStrategy::Apply, ActuationStatus::Failed, ReconcileStatus::Skipped))
        );
    }
}
