use thiserror::Error;

use crate::state::{buzzer::BuzzEntry, state_machine::InvalidTransition};

/// Reasons an engine operation left the room untouched.
///
/// Rejections are expected races (out-of-order retries, stale admin screens),
/// not failures: callers log them and report the [`Rejection::code`] back to
/// the initiating client only.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    /// The operation is not available in the current phase.
    #[error("operation not allowed in the current phase")]
    InvalidPhase,
    /// The current round has already been settled.
    #[error("round {round_key} is already resolved")]
    AlreadyResolved {
        /// Key of the round that was already settled.
        round_key: String,
    },
    /// The current round has not been settled yet.
    #[error("round {round_key} is not resolved")]
    NotResolved {
        /// Key of the round that is still open.
        round_key: String,
    },
    /// No team with this identifier is registered.
    #[error("unknown team `{team_id}`")]
    UnknownTeam {
        /// Identifier that could not be found.
        team_id: String,
    },
    /// The operation requires the buzzer race category.
    #[error("current category is not the race category")]
    NotRaceCategory,
    /// No label has been drawn for the current round.
    #[error("buzzer has no active draw")]
    BuzzerIdle,
    /// Another team already holds the buzzer.
    #[error("buzzer is locked")]
    BuzzerLocked {
        /// First accepted buzz of the draw, if the lock came from a buzz.
        first: Option<BuzzEntry>,
        /// Instant the answer window closes.
        answer_window_ends_at: Option<u64>,
    },
    /// The team already buzzed for this draw.
    #[error("team already buzzed for this draw")]
    AlreadyBuzzed,
    /// Both labels of the round were already used this game.
    #[error("no buzzer label left to draw")]
    BuzzerExhausted,
    /// Confirm was requested without a named team or any buzz.
    #[error("nobody buzzed")]
    NoBuzz,
    /// Submissions are closed for the current round.
    #[error("submissions are closed")]
    SubmissionClosed,
    /// The submission payload cannot be normalised for its category.
    #[error("invalid payload: {reason}")]
    InvalidPayload {
        /// Human readable explanation.
        reason: String,
    },
    /// Round navigation would leave the category bounds.
    #[error("round index out of range")]
    RoundOutOfRange,
    /// No settled result is waiting to be announced.
    #[error("no pending result to announce")]
    NothingToAnnounce,
    /// Resume needs a stopped timer with time left on it.
    #[error("timer is not paused")]
    TimerNotPaused,
    /// The phase machine refused the transition.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

impl Rejection {
    /// Stable snake_case identifier sent in acknowledgements.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPhase => "invalid_phase",
            Self::AlreadyResolved { .. } => "already_resolved",
            Self::NotResolved { .. } => "not_resolved",
            Self::UnknownTeam { .. } => "unknown_team",
            Self::NotRaceCategory => "not_race_category",
            Self::BuzzerIdle => "buzzer_idle",
            Self::BuzzerLocked { .. } => "buzzer_locked",
            Self::AlreadyBuzzed => "already_buzzed",
            Self::BuzzerExhausted => "buzzer_exhausted",
            Self::NoBuzz => "no_buzz",
            Self::SubmissionClosed => "submission_closed",
            Self::InvalidPayload { .. } => "invalid_payload",
            Self::RoundOutOfRange => "round_out_of_range",
            Self::NothingToAnnounce => "nothing_to_announce",
            Self::TimerNotPaused => "timer_not_paused",
            Self::InvalidTransition(_) => "invalid_transition",
        }
    }

    pub(crate) fn unknown_team(team_id: &str) -> Self {
        Self::UnknownTeam {
            team_id: team_id.to_owned(),
        }
    }

    pub(crate) fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            reason: reason.into(),
        }
    }
}
