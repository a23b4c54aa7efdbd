use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{
        common::{AdminStateSnapshot, PublicStateSnapshot, team_summaries},
        sse::{GameResetEvent, ResetKind, ServerEvent, SystemStatus, TeamsUpdateEvent},
    },
    state::{
        AppState, GameRoom,
        ledger::{Announcement, CategorySummary},
    },
};

/// Phase, round, stakes, timer or buzzer changed.
pub const EVENT_STATE_UPDATE: &str = "state.update";
/// Team list or balances changed.
pub const EVENT_TEAMS_UPDATE: &str = "teams.update";
/// A round settlement was announced.
pub const EVENT_RESULT_ANNOUNCE: &str = "result.announce";
/// Totals of the category just closed.
pub const EVENT_CATEGORY_SUMMARY: &str = "category.summary";
/// The room was reset.
pub const EVENT_GAME_RESET: &str = "game.reset";
/// Persistence entered or left degraded mode.
pub const EVENT_SYSTEM_STATUS: &str = "system.status";
/// First event on every stream.
pub const EVENT_HANDSHAKE: &str = "handshake";

/// Broadcast the room state: the public view to everyone, the full view to operators.
///
/// Call while holding the room so events leave in mutation order.
pub fn broadcast_state(state: &AppState, room: &GameRoom, now: u64) {
    send_public_event(state, EVENT_STATE_UPDATE, &PublicStateSnapshot::capture(room, now));
    send_admin_event(state, EVENT_STATE_UPDATE, &AdminStateSnapshot::capture(room, now));
}

/// Broadcast the team list after a join, edit, kick or balance change.
pub fn broadcast_teams(state: &AppState, room: &GameRoom) {
    let payload = TeamsUpdateEvent {
        teams: team_summaries(room),
    };
    send_public_event(state, EVENT_TEAMS_UPDATE, &payload);
    send_admin_event(state, EVENT_TEAMS_UPDATE, &payload);
}

/// Broadcast an announced settlement with its recap.
pub fn broadcast_result(state: &AppState, announcement: &Announcement) {
    send_public_event(state, EVENT_RESULT_ANNOUNCE, announcement);
    send_admin_event(state, EVENT_RESULT_ANNOUNCE, announcement);
}

/// Broadcast the per-team earnings of a finished category.
pub fn broadcast_category_summary(state: &AppState, summary: &CategorySummary) {
    send_public_event(state, EVENT_CATEGORY_SUMMARY, summary);
    send_admin_event(state, EVENT_CATEGORY_SUMMARY, summary);
}

/// Broadcast an abort to the lobby or a full reset.
pub fn broadcast_reset(state: &AppState, kind: ResetKind) {
    let payload = GameResetEvent { kind };
    send_public_event(state, EVENT_GAME_RESET, &payload);
    send_admin_event(state, EVENT_GAME_RESET, &payload);
}

/// Tell operators whether snapshots are being written.
pub fn broadcast_system_status(state: &AppState, degraded: bool) {
    send_admin_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

fn send_public_event(state: &AppState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.public_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize public SSE payload"),
    }
}

fn send_admin_event(state: &AppState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.admin_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize admin SSE payload"),
    }
}
