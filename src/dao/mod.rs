/// Persisted document layouts.
pub mod models;
/// Snapshot backends and the trait they implement.
pub mod snapshot_store;
/// Storage error types shared by every backend.
pub mod storage;
