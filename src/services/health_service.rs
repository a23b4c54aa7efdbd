use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Respond with the degraded flag and team count while logging storage issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    if let Err(err) = state.snapshot_store().health_check().await {
        warn!(error = %err, "snapshot store health check failed");
    }

    let teams = state.with_room(|room| room.teams().len()).await;
    if state.is_degraded() {
        HealthResponse::degraded(teams)
    } else {
        HealthResponse::ok(teams)
    }
}
