//! Business logic behind the admin REST routes.
//!
//! Commands posted over HTTP run through the same path as WebSocket ones;
//! the team routes are thin shortcuts for the two most common edits.

use serde_json::Value;

use crate::{
    dto::{
        admin::{AdminStateResponse, ConnectedClient, ScheduledTask, TeamPatchRequest},
        common::{AdminStateSnapshot, TeamSummary, team_summaries},
        ws::{CommandAck, CommandEnvelope},
    },
    error::ServiceError,
    services::{
        command_service::{self, Actor},
        sse_events,
    },
    state::{Rejection, SharedState},
};

/// Debug view of the room, its scheduler and connections.
pub async fn admin_state(state: &SharedState) -> AdminStateResponse {
    let now = state.now_ms();
    let connected_clients = state
        .clients()
        .iter()
        .map(|entry| ConnectedClient::from(entry.value()))
        .collect();
    let degraded = state.is_degraded();
    state
        .with_room(|room| AdminStateResponse {
            snapshot: AdminStateSnapshot::capture(room, now),
            teams: team_summaries(room),
            scheduled: room
                .scheduler()
                .entries()
                .into_iter()
                .map(ScheduledTask::from)
                .collect(),
            idempotency_entries: room.idempotency_entries(),
            connected_clients,
            degraded,
        })
        .await
}

/// Parse and apply an admin command posted over HTTP.
///
/// Rejections by the room are reported inside the ack, like on the socket;
/// only a body that is not a command at all is an error.
pub async fn execute_command(state: &SharedState, raw: Value) -> Result<CommandAck, ServiceError> {
    let envelope = CommandEnvelope::from_value(raw)
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;
    Ok(command_service::execute(state, &Actor::admin(), envelope).await)
}

/// Apply a partial edit to one team.
pub async fn update_team(
    state: &SharedState,
    team_id: &str,
    patch: TeamPatchRequest,
) -> Result<TeamSummary, ServiceError> {
    let now = state.now_ms();
    let team = state
        .with_room_mut(|room| {
            let team = room.update_team(team_id, patch.into())?;
            sse_events::broadcast_state(state, room, now);
            sse_events::broadcast_teams(state, room);
            Ok::<_, Rejection>(team)
        })
        .await?;

    state.schedule_persist();
    Ok(TeamSummary::from(&team))
}

/// Remove a team together with its stake, submission and buzz entries.
pub async fn kick_team(state: &SharedState, team_id: &str) -> Result<(), ServiceError> {
    let now = state.now_ms();
    state
        .with_room_mut(|room| {
            room.kick_team(team_id)?;
            sse_events::broadcast_state(state, room, now);
            sse_events::broadcast_teams(state, room);
            Ok::<_, Rejection>(())
        })
        .await?;

    state.schedule_persist();
    Ok(())
}
