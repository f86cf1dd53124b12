use crate::types::Snapshot;

/// Holds the latest [`Snapshot`]. Writes swap an `Arc` under a write lock,
/// so readers either get the old snapshot or the new one, never a mix.
pub struct SnapshotStore {
    inner: std::sync::Arc<std::sync::RwLock<std::sync::Arc<Snapshot>>>,
}

impl SnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        SnapshotStore {
            inner: std::sync::Arc::new(std::sync::RwLock::new(std::sync::Arc::new(
                Snapshot::empty(),
            ))),
        }
    }

    pub fn replace(&self, snapshot: Snapshot) {
        let snapshot = std::sync::Arc::new(snapshot);
        // A poisoned lock still guards a whole Arc; recover and overwrite it.
        let mut current = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *current = snapshot;
    }

    #[must_use]
    pub fn read(&self) -> std::sync::Arc<Snapshot> {
        read_current(&self.inner)
    }

    #[must_use]
    pub fn get_snapshot_viewer(&self) -> SnapshotViewer {
        SnapshotViewer {
            inner: self.inner.clone(),
        }
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        SnapshotStore::new()
    }
}

/// Read-only handle onto a [`SnapshotStore`].
#[derive(Clone)]
pub struct SnapshotViewer {
    inner: std::sync::Arc<std::sync::RwLock<std::sync::Arc<Snapshot>>>,
}

impl SnapshotViewer {
    #[must_use]
    pub fn read(&self) -> std::sync::Arc<Snapshot> {
        read_current(&self.inner)
    }
}

// The read lock is held only for the Arc clone.
fn read_current(
    inner: &std::sync::RwLock<std::sync::Arc<Snapshot>>,
) -> std::sync::Arc<Snapshot> {
    inner
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clone()
}
