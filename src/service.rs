use crate::filter::filter;
use crate::ingestor::PositionSource;
use crate::observer::RefreshObserver;
use crate::scheduler::RefreshScheduler;
use crate::store::{SnapshotStore, SnapshotViewer};
use crate::types::{BoundingBox, PositionRecord, Snapshot};

/// The cache as seen by request handlers.
///
/// Owns its store and scheduler, so several independent services can live
/// side by side (one per test, for instance).
pub struct FlightService {
    scheduler: RefreshScheduler,
    viewer: SnapshotViewer,
}

impl FlightService {
    #[must_use]
    pub fn new(
        source: std::sync::Arc<dyn PositionSource>,
        period: std::time::Duration,
        observer: std::sync::Arc<dyn RefreshObserver>,
    ) -> Self {
        let store = std::sync::Arc::new(SnapshotStore::new());
        let viewer = store.get_snapshot_viewer();
        FlightService {
            scheduler: RefreshScheduler::new(source, store, period, observer),
            viewer,
        }
    }

    /// Marks the caller as a consumer until the guard is dropped.
    #[must_use]
    pub fn acquire(&self) -> DemandGuard<'_> {
        self.scheduler.enter();
        DemandGuard {
            scheduler: &self.scheduler,
        }
    }

    /// Records of the current snapshot inside `bounding_box`.
    ///
    /// Demand is held for the duration of the call and released on every
    /// exit path, unwinding included.
    #[must_use]
    pub fn query(&self, bounding_box: &BoundingBox) -> Vec<PositionRecord> {
        let _guard = self.acquire();
        let snapshot = self.viewer.read();
        let records = filter(&snapshot, bounding_box);
        log::debug!(
            "Query {bounding_box} matched {0} of {1} records",
            records.len(),
            snapshot.len()
        );
        records
    }

    #[must_use]
    pub fn snapshot(&self) -> std::sync::Arc<Snapshot> {
        self.viewer.read()
    }

    #[must_use]
    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

/// Scoped demand: entered on creation, left on drop.
pub struct DemandGuard<'a> {
    scheduler: &'a RefreshScheduler,
}

impl Drop for DemandGuard<'_> {
    fn drop(&mut self) {
        // Each guard pairs with exactly one enter, so this cannot underflow.
        let _ = self.scheduler.leave();
    }
}
