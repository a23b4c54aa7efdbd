//! Snapshots of the room shared by the REST, SSE and WebSocket layers.

use indexmap::IndexMap;
use serde::Serialize;
use serde_with::skip_serializing_none;
use utoipa::ToSchema;

use crate::{
    dto::format_epoch_ms,
    state::{
        GameRoom,
        buzzer::{BuzzEntry, BuzzerPhase},
        category::CategoryId,
        game::{
            CategoryStats, ROUNDS_PER_CATEGORY, ResolutionRecord, Stake, Submission, Team, TeamId,
        },
        state_machine::Phase,
    },
};

/// Team as shown to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    /// Stable identity, derived from the client token.
    pub id: TeamId,
    /// Name shown on screens.
    pub display_name: String,
    /// Avatar chosen by the team.
    pub avatar_ref: Option<String>,
    /// Tokens left to wager.
    pub token_balance: u32,
    /// Jokers left.
    pub joker_count: u32,
    /// RFC 3339 instant of the first join.
    pub joined_at: String,
}

impl From<&Team> for TeamSummary {
    fn from(team: &Team) -> Self {
        Self {
            id: team.id.clone(),
            display_name: team.display_name.clone(),
            avatar_ref: team.avatar_ref.clone(),
            token_balance: team.token_balance,
            joker_count: team.joker_count,
            joined_at: format_epoch_ms(team.joined_at),
        }
    }
}

/// Every registered team, in join order.
pub fn team_summaries(room: &GameRoom) -> Vec<TeamSummary> {
    room.teams().iter().map(TeamSummary::from).collect()
}

/// Countdown with the remaining time already computed against `serverNow`.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    /// Deadline of a running countdown.
    pub ends_at: Option<u64>,
    /// Length the countdown was started with.
    pub duration_sec: u32,
    /// Remainder frozen by a stop.
    pub paused_remaining_sec: u32,
    /// Deadline of the last natural expiry.
    pub last_expired_at: Option<u64>,
    /// `max(0, endsAt - serverNow)`.
    pub remaining_ms: u64,
    /// Whether the countdown is ticking at `serverNow`.
    pub running: bool,
}

/// Race sub-state, present only while the race category is played.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuzzerView {
    /// Where the race currently stands.
    pub phase: BuzzerPhase,
    /// Label of the current draw.
    pub active_category_id: Option<String>,
    /// Labels already drawn this game.
    pub used_category_ids: Vec<String>,
    /// Buzzes in arrival order.
    pub buzz_order: Vec<BuzzEntry>,
    /// Whether further buzzes are refused.
    pub locked: bool,
    /// End of the first buzzer's answer window.
    pub answer_window_ends_at: Option<u64>,
    /// Whether the draw ran out of labels.
    pub exhausted: bool,
}

/// State broadcast to every participant.
///
/// Submissions are reduced to the list of teams that answered and a pending
/// settlement stays hidden until the admin announces it.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicStateSnapshot {
    /// Current phase.
    pub phase: Phase,
    /// Category being played.
    pub current_category: Option<CategoryId>,
    /// Zero-based round within the category.
    pub round_index: u32,
    /// Rounds a category lasts.
    pub rounds_per_category: u32,
    /// Stake per team.
    #[schema(value_type = Object)]
    pub stakes: IndexMap<TeamId, Stake>,
    /// Stakes a team may choose right now.
    pub allowed_stakes: Vec<u32>,
    /// Pot fixed at stake lock.
    pub category_pot: u32,
    /// Tie remainder carried into the next settlement.
    pub carry_round: u32,
    /// Share of the pot paid each round.
    pub payout_per_round: u32,
    /// Whether the current round was settled.
    pub round_resolved: bool,
    /// Teams that answered this round.
    pub submitted_team_ids: Vec<TeamId>,
    /// Last settlement, once announced.
    pub last_result: Option<ResolutionRecord>,
    /// Shared countdown.
    pub timer: TimerView,
    /// Race state, race category only.
    pub buzzer: Option<BuzzerView>,
    /// Categories finished so far.
    pub played_categories: Vec<CategoryId>,
    /// Server clock at snapshot time, epoch milliseconds.
    pub server_now: u64,
}

/// State broadcast to operators: the public view plus everything it hides.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminStateSnapshot {
    /// Everything participants see.
    #[serde(flatten)]
    pub public: PublicStateSnapshot,
    /// Answers of the current round.
    #[schema(value_type = Object)]
    pub submissions: IndexMap<TeamId, Submission>,
    /// Settlement not announced yet.
    pub pending_result: Option<ResolutionRecord>,
    /// Per-team tallies for the running category.
    #[schema(value_type = Object)]
    pub category_stats: IndexMap<TeamId, CategoryStats>,
    /// Round keys already settled.
    pub resolved_rounds: Vec<String>,
}

impl PublicStateSnapshot {
    /// Project the room as seen by participants at `now`.
    pub fn capture(room: &GameRoom, now: u64) -> Self {
        let state = room.state();
        let timer = &state.timer;
        let buzzer = state
            .current_category
            .filter(|category| category.is_race())
            .map(|_| BuzzerView {
                phase: state.buzzer.phase(),
                active_category_id: state.buzzer.active_category_id.clone(),
                used_category_ids: state.buzzer.used_category_ids.iter().cloned().collect(),
                buzz_order: state.buzzer.buzz_order.clone(),
                locked: state.buzzer.locked,
                answer_window_ends_at: state.buzzer.answer_window_ends_at,
                exhausted: state.buzzer.exhausted,
            });

        Self {
            phase: state.phase(),
            current_category: state.current_category,
            round_index: state.round_index,
            rounds_per_category: ROUNDS_PER_CATEGORY,
            stakes: state.stakes.clone(),
            allowed_stakes: room.allowed_stakes().to_vec(),
            category_pot: state.category_pot,
            carry_round: state.carry_round,
            payout_per_round: state.payout_per_round(),
            round_resolved: state.is_resolved(),
            submitted_team_ids: state.submissions.keys().cloned().collect(),
            last_result: state
                .pending_result
                .is_none()
                .then(|| state.last_result.clone())
                .flatten(),
            timer: TimerView {
                ends_at: timer.ends_at,
                duration_sec: timer.duration_sec,
                paused_remaining_sec: timer.paused_remaining_sec,
                last_expired_at: timer.last_expired_at,
                remaining_ms: timer.remaining_ms(now),
                running: timer.is_running(now),
            },
            buzzer,
            played_categories: state.played_categories.iter().copied().collect(),
            server_now: now,
        }
    }
}

impl AdminStateSnapshot {
    /// Project the full room at `now`.
    pub fn capture(room: &GameRoom, now: u64) -> Self {
        let state = room.state();
        Self {
            public: PublicStateSnapshot::capture(room, now),
            submissions: state.submissions.clone(),
            pending_result: state.pending_result.clone(),
            category_stats: state.category_stats.clone(),
            resolved_rounds: state.resolved_rounds.iter().cloned().collect(),
        }
    }
}
