use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::{
    buzzer::BuzzerState,
    category::{CategoryId, SubmissionPayload},
    state_machine::{GameStateMachine, Phase},
    timer::TimerState,
};

/// Stable team identifier (client token or connection id).
pub type TeamId = String;

/// Number of rounds played per category.
pub const ROUNDS_PER_CATEGORY: u32 = 3;
/// Tokens the house adds to every category pot.
pub const FIXED_POT_BASE: u32 = 3;
/// Smallest stake that actually costs tokens.
pub const MIN_PAID_STAKE: u32 = 3;

/// Team identity and economy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    /// Stable identifier.
    pub id: TeamId,
    /// Name shown on screens.
    pub display_name: String,
    /// Optional avatar reference chosen by the team.
    #[serde(default)]
    pub avatar_ref: Option<String>,
    /// Tokens available for wagering.
    #[serde(default)]
    pub token_balance: u32,
    /// Jokers left (each doubles one stake).
    #[serde(default)]
    pub joker_count: u32,
    /// Instant of the first join, epoch milliseconds.
    #[serde(default)]
    pub joined_at: u64,
}

/// Wager of a team on the current category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct Stake {
    /// Tokens wagered.
    pub amount: u32,
    /// Whether a joker doubles the stake's contribution to the pot.
    pub joker_applied: bool,
}

/// Latest answer of a team for the current round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// Normalised answer.
    pub payload: SubmissionPayload,
    /// Instant the answer was accepted.
    pub submitted_at: u64,
}

/// Outcome of one settled round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionRecord {
    /// Key of the settled round.
    pub round_key: String,
    /// Category the round belongs to.
    pub category: CategoryId,
    /// Index of the round inside the category.
    pub round_index: u32,
    /// Teams that were paid (empty for "no winner").
    pub winner_ids: Vec<TeamId>,
    /// Per-round share of the category pot.
    pub payout: u32,
    /// Payout plus the carry that was consumed.
    pub total_pot: u32,
    /// Carry left for the next round.
    pub carry_after: u32,
    /// Amount each winner received.
    pub per_winner_share: Option<u32>,
    /// Tie remainder dropped on the final round.
    #[serde(default)]
    pub remainder_discarded: u32,
    /// Instant of the settlement.
    pub resolved_at: u64,
}

/// Per-team tally for the running category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct CategoryStats {
    /// Rounds won.
    pub wins: u32,
    /// Tokens earned.
    pub earnings: u32,
}

/// Whole mutable state of a room, minus the team registry.
///
/// Every field defaults so an older or partial snapshot overlays cleanly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GameState {
    /// Phase machine.
    pub machine: GameStateMachine,
    /// Category being wagered on or played.
    pub current_category: Option<CategoryId>,
    /// Current round inside the category.
    pub round_index: u32,
    /// Wagers keyed by team.
    pub stakes: IndexMap<TeamId, Stake>,
    /// Pot fixed when stakes are locked.
    pub category_pot: u32,
    /// Unpaid tokens rolled into the next round.
    pub carry_round: u32,
    /// Answers of the current round.
    pub submissions: IndexMap<TeamId, Submission>,
    /// Round keys already settled.
    pub resolved_rounds: BTreeSet<String>,
    /// Settlement waiting to be announced.
    pub pending_result: Option<ResolutionRecord>,
    /// Most recent settlement, kept for undo.
    pub last_result: Option<ResolutionRecord>,
    /// Shared countdown.
    pub timer: TimerState,
    /// Race arbitration.
    pub buzzer: BuzzerState,
    /// Wins and earnings in the running category.
    pub category_stats: IndexMap<TeamId, CategoryStats>,
    /// Categories completed this game.
    pub played_categories: BTreeSet<CategoryId>,
}

impl GameState {
    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    /// Key guarding the current round against double settlement.
    pub fn round_key(&self) -> Option<String> {
        self.current_category
            .map(|category| round_key(category, self.round_index))
    }

    /// Whether the current round has been settled.
    pub fn is_resolved(&self) -> bool {
        self.round_key()
            .is_some_and(|key| self.resolved_rounds.contains(&key))
    }

    /// Per-round share of the pot.
    pub fn payout_per_round(&self) -> u32 {
        self.category_pot / ROUNDS_PER_CATEGORY
    }

    /// Whether the current round is the category's last.
    pub fn is_final_round(&self) -> bool {
        self.round_index + 1 >= ROUNDS_PER_CATEGORY
    }
}

/// Build the round key for a category and round index.
pub fn round_key(category: CategoryId, round_index: u32) -> String {
    format!("{category}:{round_index}")
}
