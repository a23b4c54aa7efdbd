use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::common::TeamSummary;

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels and forwarded to WebSocket clients.
pub struct ServerEvent {
    /// SSE event name.
    pub event: Option<String>,
    /// JSON payload.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream (`public` or `admin`).
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the last snapshot write failed.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    /// Whether the last snapshot write failed.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast whenever a team joins, is edited, kicked, or its balance moves.
pub struct TeamsUpdateEvent {
    /// Registered teams, in join order.
    pub teams: Vec<TeamSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
/// Which reset happened.
pub enum ResetKind {
    /// The running category was aborted; teams are kept.
    Lobby,
    /// Teams and state were wiped.
    Full,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast after an abort to the lobby or a full reset.
pub struct GameResetEvent {
    /// Which reset happened.
    pub kind: ResetKind,
}
