//! Read-only projections served to public clients.

use crate::{dto::common::PublicStateSnapshot, state::SharedState};

/// Capture the snapshot public screens render from.
pub async fn state_snapshot(state: &SharedState) -> PublicStateSnapshot {
    let now = state.now_ms();
    state
        .with_room(|room| PublicStateSnapshot::capture(room, now))
        .await
}
