// =============================================================================
// DataHub — single-slot publish point for the latest Snapshot
// =============================================================================
//
// The write lock is held only long enough to swap an `Arc`, so readers never
// contend with the writer for more than a pointer-store's worth of time, and
// never see a torn snapshot.
// =============================================================================

use std::sync::Arc;

use parking_lot::RwLock;

use crate::snapshot::Snapshot;

pub struct DataHub {
    latest: RwLock<Option<Arc<Snapshot>>>,
}

impl DataHub {
    pub fn new() -> Self {
        Self {
            latest: RwLock::new(None),
        }
    }

    pub fn publish(&self, snapshot: Snapshot) {
        *self.latest.write() = Some(Arc::new(snapshot));
    }

    pub fn get_latest(&self) -> Option<Arc<Snapshot>> {
        self.latest.read().clone()
    }
}

impl Default for DataHub {
    fn default() -> Self {
        Self::new()
    }
}
