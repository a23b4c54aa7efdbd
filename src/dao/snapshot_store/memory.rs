use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use futures::future::BoxFuture;

use crate::dao::{models::SnapshotDocuments, snapshot_store::SnapshotStore, storage::StorageResult};

/// Snapshot store kept in process memory.
///
/// Used when the data directory is unusable, so the game keeps running
/// without crash recovery.
#[derive(Clone, Default)]
pub struct MemorySnapshotStore {
    documents: Arc<Mutex<Option<SnapshotDocuments>>>,
    saves: Arc<AtomicUsize>,
}

impl MemorySnapshotStore {
    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, documents: SnapshotDocuments) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            if let Ok(mut slot) = store.documents.lock() {
                *slot = Some(documents);
            }
            store.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn load(&self) -> BoxFuture<'static, StorageResult<Option<SnapshotDocuments>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .documents
                .lock()
                .ok()
                .and_then(|slot| slot.clone()))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
