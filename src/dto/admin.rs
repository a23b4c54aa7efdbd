//! DTO definitions used by the admin REST API and documentation layer.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::{
        common::{AdminStateSnapshot, TeamSummary},
        validation::validate_display_name,
        ws::ClientRole,
    },
    state::{
        ClientConnection,
        game::TeamId,
        scheduler::{Deadline, TaskKind},
        teams::TeamPatch,
    },
};

/// Partial team edit. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, ToSchema, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct TeamPatchRequest {
    /// New display name, trimmed.
    #[validate(
        length(min = 1, max = 32),
        custom(function = "validate_display_name")
    )]
    pub display_name: Option<String>,
    /// New avatar reference.
    #[validate(length(max = 256))]
    pub avatar_ref: Option<String>,
    /// Balance to set.
    #[validate(range(max = 100_000))]
    pub token_balance: Option<u32>,
    /// Jokers to set.
    #[validate(range(max = 9))]
    pub joker_count: Option<u32>,
}

impl From<TeamPatchRequest> for TeamPatch {
    fn from(value: TeamPatchRequest) -> Self {
        Self {
            display_name: value.display_name,
            avatar_ref: value.avatar_ref,
            token_balance: value.token_balance,
            joker_count: value.joker_count,
        }
    }
}

/// Deferred task waiting in the room scheduler.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    /// Task waiting to fire.
    pub kind: TaskKind,
    /// Due instant, epoch milliseconds.
    pub at: u64,
    /// Context the task was armed for, e.g. the draw number.
    pub context: u64,
}

impl From<(TaskKind, Deadline)> for ScheduledTask {
    fn from((kind, deadline): (TaskKind, Deadline)) -> Self {
        Self {
            kind,
            at: deadline.at,
            context: deadline.context,
        }
    }
}

/// Open WebSocket connection.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedClient {
    /// Per-connection UUID.
    pub connection_id: String,
    /// Role given at identification.
    pub role: ClientRole,
    /// Identity team commands act on.
    pub team_id: Option<TeamId>,
}

impl From<&ClientConnection> for ConnectedClient {
    fn from(connection: &ClientConnection) -> Self {
        Self {
            connection_id: connection.id.clone(),
            role: connection.role,
            team_id: connection.team_id.clone(),
        }
    }
}

/// Debug view of the whole room returned by `GET /admin/state`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminStateResponse {
    /// Same view the admin stream carries.
    pub snapshot: AdminStateSnapshot,
    /// Registered teams, in join order.
    pub teams: Vec<TeamSummary>,
    /// Pending deadlines, earliest first.
    pub scheduled: Vec<ScheduledTask>,
    /// Action ids currently remembered by the idempotency guard.
    pub idempotency_entries: usize,
    /// Open WebSocket connections.
    pub connected_clients: Vec<ConnectedClient>,
    /// Whether the last snapshot write failed.
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::teams::MAX_TEAM_NAME_CHARS;

    #[test]
    fn patch_rejects_blank_or_oversized_names() {
        let blank: TeamPatchRequest =
            serde_json::from_str(r#"{ "displayName": "   " }"#).unwrap();
        assert!(blank.validate().is_err());

        let long = TeamPatchRequest {
            display_name: Some("x".repeat(MAX_TEAM_NAME_CHARS + 1)),
            ..TeamPatchRequest::default()
        };
        assert!(long.validate().is_err());

        let jokers = TeamPatchRequest {
            joker_count: Some(12),
            ..TeamPatchRequest::default()
        };
        assert!(jokers.validate().is_err());
    }

    #[test]
    fn empty_patch_is_valid_and_changes_nothing() {
        let patch: TeamPatchRequest = serde_json::from_str("{}").unwrap();
        assert!(patch.validate().is_ok());
        assert_eq!(TeamPatch::from(patch), TeamPatch::default());
    }
}
