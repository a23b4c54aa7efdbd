//! Frames exchanged with WebSocket clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use thiserror::Error;
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dto::validation::{MAX_CLIENT_TOKEN_LEN, validate_client_token},
    dto::admin::TeamPatchRequest,
    state::{game::TeamId, ledger::UndoSnapshot},
};

const IDENTIFICATION_TYPE: &str = "identification";

/// Failure to turn a text frame into a message.
#[derive(Debug, Error)]
pub enum InboundError {
    /// The frame is not JSON of the expected shape.
    #[error("malformed message: {0}")]
    Parse(#[from] serde_json::Error),
    /// The frame parsed but carries invalid values.
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationErrors),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
/// Who sits behind a connection.
pub enum ClientRole {
    /// A playing team.
    Team,
    /// The operator.
    Admin,
}

#[derive(Debug, Deserialize, ToSchema)]
/// First frame a client must send.
pub struct IdentificationMessage {
    /// Always `identification`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Team or admin.
    pub role: ClientRole,
    /// Persistent token the team identity is derived from.
    #[serde(default)]
    pub client_token: Option<String>,
}

impl IdentificationMessage {
    /// Parse and validate an identification frame.
    pub fn from_json_str(text: &str) -> Result<Self, InboundError> {
        let message: Self = serde_json::from_str(text)?;
        message.validate()?;
        Ok(message)
    }
}

impl Validate for IdentificationMessage {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.kind != IDENTIFICATION_TYPE {
            let mut err = ValidationError::new("identification_type");
            err.message = Some("First message must be an identification".into());
            errors.add("type", err);
        }

        if let Some(ref token) = self.client_token {
            if let Err(e) = validate_client_token(token) {
                errors.add("client_token", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// A command frame: optional retry key plus the command itself.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    /// Caller generated id; a repeat within the idempotency window is ignored.
    #[serde(default)]
    pub action_id: Option<String>,
    /// The command to apply.
    #[serde(flatten)]
    pub command: ClientCommand,
}

impl CommandEnvelope {
    /// Parse and validate a command frame.
    pub fn from_json_str(text: &str) -> Result<Self, InboundError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Validate a command already decoded as JSON.
    pub fn from_value(value: Value) -> Result<Self, InboundError> {
        let envelope: Self = serde_json::from_value(value)?;
        envelope.validate()?;
        Ok(envelope)
    }
}

impl Validate for CommandEnvelope {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(ref action_id) = self.action_id {
            if action_id.is_empty() || action_id.len() > MAX_CLIENT_TOKEN_LEN {
                let mut err = ValidationError::new("action_id_length");
                err.message = Some(
                    format!("Action id must be 1 to {MAX_CLIENT_TOKEN_LEN} characters").into(),
                );
                errors.add("actionId", err);
            }
        }

        if let ClientCommand::TeamUpdate { ref patch, .. } = self.command {
            if let Err(patch_errors) = patch.validate() {
                errors.merge_self("patch", Err(patch_errors));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Every command of the room, tagged by `type`.
///
/// Numeric inputs a client may send as text (stake amount, timer seconds) are
/// kept raw and coerced by the command service.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(tag = "type")]
pub enum ClientCommand {
    #[serde(rename = "team.join", rename_all = "camelCase")]
    Join {
        #[serde(default)]
        name: String,
        #[serde(default)]
        avatar_ref: Option<String>,
    },
    #[serde(rename = "team.setStake", rename_all = "camelCase")]
    SetStake {
        #[serde(default)]
        #[schema(value_type = Object)]
        amount: Value,
        #[serde(default)]
        use_joker: bool,
    },
    #[serde(rename = "team.submit", rename_all = "camelCase")]
    Submit {
        category: String,
        #[serde(default)]
        #[schema(value_type = Object)]
        payload: Value,
    },
    #[serde(rename = "team.buzz")]
    Buzz,
    #[serde(rename = "admin.startCategory", rename_all = "camelCase")]
    StartCategory { category_id: String },
    #[serde(rename = "admin.lockStakes")]
    LockStakes,
    #[serde(rename = "admin.resolveRound", rename_all = "camelCase")]
    ResolveRound {
        #[serde(default)]
        winner_ids: Vec<TeamId>,
    },
    #[serde(rename = "admin.announceResult")]
    AnnounceResult,
    #[serde(rename = "admin.undoRound")]
    UndoRound { snapshot: UndoSnapshot },
    #[serde(rename = "admin.nextRound")]
    NextRound,
    #[serde(rename = "admin.prevRound")]
    PrevRound,
    #[serde(rename = "admin.finishCategory")]
    FinishCategory,
    #[serde(rename = "admin.gotoLobby")]
    GotoLobby,
    #[serde(rename = "admin.fullReset")]
    FullReset,
    #[serde(rename = "admin.timer.start")]
    TimerStart {
        #[serde(default)]
        #[schema(value_type = Object)]
        seconds: Value,
    },
    #[serde(rename = "admin.timer.stop")]
    TimerStop,
    #[serde(rename = "admin.timer.resume")]
    TimerResume,
    #[serde(rename = "admin.timer.reset")]
    TimerReset,
    #[serde(rename = "admin.buzzer.draw")]
    BuzzerDraw,
    #[serde(rename = "admin.buzzer.confirm", rename_all = "camelCase")]
    BuzzerConfirm {
        #[serde(default)]
        team_id: Option<TeamId>,
    },
    #[serde(rename = "admin.buzzer.clearBuzz")]
    BuzzerClear,
    #[serde(rename = "admin.buzzer.unlock")]
    BuzzerUnlock,
    #[serde(rename = "admin.buzzer.setLock")]
    BuzzerSetLock { locked: bool },
    #[serde(rename = "admin.team.update", rename_all = "camelCase")]
    TeamUpdate {
        team_id: TeamId,
        #[serde(default)]
        patch: TeamPatchRequest,
    },
    #[serde(rename = "admin.team.kick", rename_all = "camelCase")]
    TeamKick { team_id: TeamId },
}

impl ClientCommand {
    /// Wire name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "team.join",
            Self::SetStake { .. } => "team.setStake",
            Self::Submit { .. } => "team.submit",
            Self::Buzz => "team.buzz",
            Self::StartCategory { .. } => "admin.startCategory",
            Self::LockStakes => "admin.lockStakes",
            Self::ResolveRound { .. } => "admin.resolveRound",
            Self::AnnounceResult => "admin.announceResult",
            Self::UndoRound { .. } => "admin.undoRound",
            Self::NextRound => "admin.nextRound",
            Self::PrevRound => "admin.prevRound",
            Self::FinishCategory => "admin.finishCategory",
            Self::GotoLobby => "admin.gotoLobby",
            Self::FullReset => "admin.fullReset",
            Self::TimerStart { .. } => "admin.timer.start",
            Self::TimerStop => "admin.timer.stop",
            Self::TimerResume => "admin.timer.resume",
            Self::TimerReset => "admin.timer.reset",
            Self::BuzzerDraw => "admin.buzzer.draw",
            Self::BuzzerConfirm { .. } => "admin.buzzer.confirm",
            Self::BuzzerClear => "admin.buzzer.clearBuzz",
            Self::BuzzerUnlock => "admin.buzzer.unlock",
            Self::BuzzerSetLock { .. } => "admin.buzzer.setLock",
            Self::TeamUpdate { .. } => "admin.team.update",
            Self::TeamKick { .. } => "admin.team.kick",
        }
    }

    /// Role allowed to send this command.
    pub fn required_role(&self) -> ClientRole {
        match self {
            Self::Join { .. } | Self::SetStake { .. } | Self::Submit { .. } | Self::Buzz => {
                ClientRole::Team
            }
            _ => ClientRole::Admin,
        }
    }
}

/// Answer to one command, sent to the initiating caller only.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommandAck {
    /// Whether the command was applied.
    pub ok: bool,
    /// Echo of the command's action id.
    pub action_id: Option<String>,
    /// Stable snake_case code when `ok` is false.
    pub error: Option<String>,
    /// Set when the action id was already applied.
    pub duplicate: Option<bool>,
    /// Command specific result.
    #[schema(value_type = Object)]
    pub data: Option<Value>,
}

impl CommandAck {
    /// Command applied.
    pub fn ok(action_id: Option<String>, data: Option<Value>) -> Self {
        Self {
            ok: true,
            action_id,
            error: None,
            duplicate: None,
            data,
        }
    }

    /// Command already applied under this action id; nothing was done.
    pub fn duplicate(action_id: Option<String>) -> Self {
        Self {
            ok: true,
            action_id,
            error: None,
            duplicate: Some(true),
            data: None,
        }
    }

    /// Command refused.
    pub fn rejected(action_id: Option<String>, code: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            ok: false,
            action_id,
            error: Some(code.into()),
            duplicate: None,
            data,
        }
    }
}

/// Frames the server pushes to a WebSocket client.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Sent once after a valid identification.
    #[serde(rename_all = "camelCase")]
    Welcome {
        connection_id: String,
        role: ClientRole,
        /// Identity `team.join` will use.
        team_id: Option<TeamId>,
        server_now: u64,
    },
    /// Answer to a command frame.
    Ack(CommandAck),
    /// Room event, same payload as the SSE stream.
    Event {
        event: String,
        #[schema(value_type = Object)]
        data: Value,
    },
}
