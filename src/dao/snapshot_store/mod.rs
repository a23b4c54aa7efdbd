pub mod file;
pub mod memory;

use futures::future::BoxFuture;

use crate::dao::{models::SnapshotDocuments, storage::StorageResult};

/// Abstraction over where room snapshots are kept.
pub trait SnapshotStore: Send + Sync {
    /// Replace the stored snapshot.
    fn save(&self, documents: SnapshotDocuments) -> BoxFuture<'static, StorageResult<()>>;
    /// Read the stored snapshot, `None` when nothing was written yet.
    fn load(&self) -> BoxFuture<'static, StorageResult<Option<SnapshotDocuments>>>;
    /// Check the backend can currently accept writes.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
