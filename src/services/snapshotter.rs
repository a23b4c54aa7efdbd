//! Debounced, crash-safe persistence of the room.

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{
    dao::{models::SnapshotDocuments, snapshot_store::SnapshotStore, storage::StorageError},
    services::sse_events,
    state::{GameRoom, SharedState, room::RoomConfig},
};

/// Rebuild the room from the last snapshot, or start empty.
///
/// An unreadable snapshot is logged and left on disk until the next write
/// replaces it.
pub async fn restore(store: &dyn SnapshotStore, config: RoomConfig) -> GameRoom {
    match store.load().await {
        Ok(Some(documents)) => {
            let saved_at = documents.state.saved_at;
            let (game, teams) = documents.into_parts();
            let room = GameRoom::restore(config, game, teams);
            info!(
                saved_at,
                phase = ?room.phase(),
                teams = room.teams().len(),
                "restored room from snapshot"
            );
            room
        }
        Ok(None) => {
            info!("no snapshot found; starting with an empty room");
            GameRoom::new(config)
        }
        Err(err) => {
            warn!(error = %err, "failed to load snapshot; starting with an empty room");
            GameRoom::new(config)
        }
    }
}

/// Write a snapshot once mutations have been quiet for `persist_debounce`.
///
/// Runs until the process exits. Requests arriving during a write leave a
/// permit behind, so they are picked up by the next cycle.
pub async fn run(state: SharedState) {
    let debounce = state.config().persist_debounce;
    loop {
        state.persist_signal().notified().await;
        loop {
            tokio::select! {
                _ = state.persist_signal().notified() => continue,
                _ = sleep(debounce) => break,
            }
        }

        if let Err(err) = flush(&state).await {
            debug!(error = %err, "debounced snapshot write failed");
        }
    }
}

/// Write the current room immediately.
///
/// A failure switches the service to degraded mode until the next success;
/// the game itself keeps running either way.
pub async fn flush(state: &SharedState) -> Result<(), StorageError> {
    let saved_at = state.now_ms();
    let documents = state
        .with_room(|room| SnapshotDocuments::capture(room.state(), room.teams(), saved_at))
        .await;

    match state.snapshot_store().save(documents).await {
        Ok(()) => {
            if state.set_degraded(false) {
                info!("snapshot written again; leaving degraded mode");
                sse_events::broadcast_system_status(state, false);
            }
            debug!(saved_at, "snapshot written");
            Ok(())
        }
        Err(err) => {
            warn!(error = %err, "failed to write snapshot; entering degraded mode");
            if state.set_degraded(true) {
                sse_events::broadcast_system_status(state, true);
            }
            Err(err)
        }
    }
}

/// Write the final snapshot, then tell open streams to close.
///
/// Called as soon as the termination signal arrives; long-lived SSE and
/// WebSocket connections would otherwise hold the graceful drain open.
pub async fn shutdown(state: &SharedState) {
    match flush(state).await {
        Ok(()) => info!("final snapshot written"),
        Err(err) => error!(error = %err, "final snapshot could not be written"),
    }
    state.begin_shutdown();
}
