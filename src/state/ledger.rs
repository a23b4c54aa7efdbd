//! Wagering, pot settlement and undo.

use std::cmp::Reverse;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::state::{
    buzzer::BuzzEntry,
    category::{CategoryId, SubmissionPayload},
    game::{
        CategoryStats, FIXED_POT_BASE, MIN_PAID_STAKE, ROUNDS_PER_CATEGORY, ResolutionRecord,
        Stake, TeamId,
    },
    rejection::Rejection,
    room::GameRoom,
    state_machine::{GameEvent, Phase},
};

const STAKES_SMALL_TABLE: &[u32] = &[0, 3, 6];
const STAKES_LARGE_TABLE: &[u32] = &[0, 3, 6, 9];

/// Balances and carry captured by the admin before a settlement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct UndoSnapshot {
    /// Balance to restore per team.
    pub token_balances: IndexMap<TeamId, u32>,
    /// Carry to restore.
    pub carry_round: u32,
}

/// Settlement published to every client, with the round recap.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    /// What was paid to whom.
    pub result: ResolutionRecord,
    /// What the teams answered.
    pub recap: Recap,
}

/// Category specific recap of a round.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recap {
    /// Answers submitted by the teams.
    Submissions {
        /// One entry per answering team.
        entries: Vec<RecapEntry>,
    },
    /// Buzzer race outcome.
    Buzzer {
        /// Label that was drawn.
        label: Option<String>,
        /// Accepted buzzes in order.
        buzz_order: Vec<BuzzEntry>,
    },
}

/// One team's answer in a recap.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecapEntry {
    /// Answering team.
    pub team_id: TeamId,
    /// Name at announcement time.
    pub display_name: String,
    /// Normalised answer.
    pub payload: SubmissionPayload,
    /// Instant the answer was accepted.
    pub submitted_at: u64,
    /// Whether the team won the round.
    pub winner: bool,
}

/// Per-team results of a finished category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    /// Category that was played.
    pub category: CategoryId,
    /// Teams, best earners first.
    pub entries: Vec<SummaryEntry>,
    /// Carry that was never paid out.
    pub unpaid_carry: u32,
}

/// One team's line in a category summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SummaryEntry {
    /// Team.
    pub team_id: TeamId,
    /// Name at summary time.
    pub display_name: String,
    /// Tokens wagered.
    pub stake: u32,
    /// Whether the team played its joker.
    pub joker_applied: bool,
    /// Rounds won.
    pub wins: u32,
    /// Tokens earned.
    pub earnings: u32,
    /// Earnings minus stake.
    pub net: i64,
}

impl GameRoom {
    /// Stakes a team may pick right now.
    pub fn allowed_stakes(&self) -> &'static [u32] {
        if self.teams.len() > 2 {
            STAKES_LARGE_TABLE
        } else {
            STAKES_SMALL_TABLE
        }
    }

    /// Record a team's wager, coercing anything invalid instead of refusing it.
    pub fn set_stake(
        &mut self,
        team_id: &str,
        amount: i64,
        use_joker: bool,
    ) -> Result<Stake, Rejection> {
        self.ensure_phase(Phase::Stake)?;
        let team = self
            .teams
            .get(team_id)
            .ok_or_else(|| Rejection::unknown_team(team_id))?;

        let mut stake_amount = u32::try_from(amount)
            .ok()
            .filter(|value| self.allowed_stakes().contains(value))
            .unwrap_or_default();
        if team.token_balance < MIN_PAID_STAKE {
            stake_amount = 0;
        }
        if i64::from(stake_amount) != amount {
            debug!(team_id, requested = amount, stored = stake_amount, "stake coerced");
        }

        let stake = Stake {
            amount: stake_amount,
            joker_applied: use_joker && stake_amount > 0 && team.joker_count > 0,
        };
        self.state.stakes.insert(team_id.to_owned(), stake);
        Ok(stake)
    }

    /// STAKE → CATEGORY: debit every wager and fix the pot.
    pub fn lock_stakes(&mut self) -> Result<u32, Rejection> {
        self.state.machine.apply(GameEvent::LockStakes)?;

        let mut pot = FIXED_POT_BASE;
        for (team_id, stake) in &self.state.stakes {
            let Some(team) = self.teams.get_mut(team_id) else {
                continue;
            };
            team.token_balance = team.token_balance.saturating_sub(stake.amount);
            pot += stake.amount;
            if stake.joker_applied {
                team.joker_count = 0;
                pot += stake.amount;
            }
        }

        self.state.category_pot = pot;
        self.state.carry_round = 0;
        self.state.round_index = 0;
        self.reset_round_context();
        info!(pot, stakes = self.state.stakes.len(), "stakes locked");
        Ok(pot)
    }

    /// Settle the current round. Each round pays out at most once.
    ///
    /// An empty `winner_ids` means nobody won and the payout rolls forward.
    pub fn resolve_round(
        &mut self,
        winner_ids: &[TeamId],
        now: u64,
    ) -> Result<ResolutionRecord, Rejection> {
        self.ensure_phase(Phase::Category)?;
        let category = self.current_category()?;
        let round_key = self.current_round_key()?;
        if self.state.resolved_rounds.contains(&round_key) {
            return Err(Rejection::AlreadyResolved { round_key });
        }

        let mut winners: Vec<TeamId> = Vec::with_capacity(winner_ids.len());
        for team_id in winner_ids {
            if self.teams.contains(team_id) && !winners.contains(team_id) {
                winners.push(team_id.clone());
            }
        }
        if let (true, Some(unknown)) = (winners.is_empty(), winner_ids.first()) {
            return Err(Rejection::unknown_team(unknown));
        }

        let payout = self.state.category_pot / ROUNDS_PER_CATEGORY;
        let total_pot = payout + self.state.carry_round;
        let mut remainder_discarded = 0;

        let per_winner_share = match winners.len() {
            0 => {
                self.state.carry_round = total_pot;
                None
            }
            1 => {
                self.state.carry_round = 0;
                Some(total_pot)
            }
            count => {
                let count = count as u32;
                let share = total_pot / count;
                let remainder = total_pot - share * count;
                if self.state.is_final_round() {
                    self.state.carry_round = 0;
                    remainder_discarded = remainder;
                    if remainder > 0 {
                        info!(%round_key, remainder, "final round tie remainder discarded");
                    }
                } else {
                    self.state.carry_round = remainder;
                }
                Some(share)
            }
        };

        if let Some(share) = per_winner_share {
            for team_id in &winners {
                self.teams.credit(team_id, share);
                let stats = self
                    .state
                    .category_stats
                    .entry(team_id.clone())
                    .or_insert_with(CategoryStats::default);
                stats.wins += 1;
                stats.earnings += share;
            }
        }

        let record = ResolutionRecord {
            round_key: round_key.clone(),
            category,
            round_index: self.state.round_index,
            winner_ids: winners,
            payout,
            total_pot,
            carry_after: self.state.carry_round,
            per_winner_share,
            remainder_discarded,
            resolved_at: now,
        };
        self.state.resolved_rounds.insert(round_key);
        self.state.pending_result = Some(record.clone());
        self.state.last_result = Some(record.clone());
        info!(
            round_key = %record.round_key,
            winners = record.winner_ids.len(),
            total_pot,
            carry_after = record.carry_after,
            "round resolved"
        );
        Ok(record)
    }

    /// Publish the pending settlement together with the round recap.
    pub fn announce_result(&mut self) -> Result<Announcement, Rejection> {
        let result = self
            .state
            .pending_result
            .take()
            .ok_or(Rejection::NothingToAnnounce)?;
        let recap = self.recap(&result);
        Ok(Announcement { result, recap })
    }

    /// Revert the current round's settlement from a caller provided snapshot.
    pub fn undo_round(&mut self, snapshot: &UndoSnapshot) -> Result<(), Rejection> {
        self.ensure_phase(Phase::Category)?;
        let round_key = self.current_round_key()?;
        if !self.state.resolved_rounds.contains(&round_key) {
            return Err(Rejection::NotResolved { round_key });
        }

        for (team_id, balance) in &snapshot.token_balances {
            if let Some(team) = self.teams.get_mut(team_id) {
                team.token_balance = *balance;
            }
        }
        self.state.carry_round = snapshot.carry_round;

        if let Some(last) = self
            .state
            .last_result
            .take()
            .filter(|record| record.round_key == round_key)
        {
            let share = last.per_winner_share.unwrap_or_default();
            for team_id in &last.winner_ids {
                if let Some(stats) = self.state.category_stats.get_mut(team_id) {
                    stats.wins = stats.wins.saturating_sub(1);
                    stats.earnings = stats.earnings.saturating_sub(share);
                }
            }
        }
        self.state.pending_result = None;
        self.state.resolved_rounds.remove(&round_key);
        info!(%round_key, "round resolution undone");
        Ok(())
    }

    pub(super) fn category_summary(&self, category: CategoryId) -> CategorySummary {
        let mut entries: Vec<SummaryEntry> = self
            .teams
            .iter()
            .map(|team| {
                let stake = self
                    .state
                    .stakes
                    .get(&team.id)
                    .copied()
                    .unwrap_or_default();
                let stats = self
                    .state
                    .category_stats
                    .get(&team.id)
                    .copied()
                    .unwrap_or_default();
                SummaryEntry {
                    team_id: team.id.clone(),
                    display_name: team.display_name.clone(),
                    stake: stake.amount,
                    joker_applied: stake.joker_applied,
                    wins: stats.wins,
                    earnings: stats.earnings,
                    net: i64::from(stats.earnings) - i64::from(stake.amount),
                }
            })
            .collect();
        entries.sort_by_key(|entry| Reverse(entry.earnings));

        CategorySummary {
            category,
            entries,
            unpaid_carry: self.state.carry_round,
        }
    }

    fn recap(&self, result: &ResolutionRecord) -> Recap {
        if result.category.is_race() {
            return Recap::Buzzer {
                label: self.state.buzzer.active_category_id.clone(),
                buzz_order: self.state.buzzer.buzz_order.clone(),
            };
        }

        let mut entries: Vec<RecapEntry> = self
            .state
            .submissions
            .iter()
            .map(|(team_id, submission)| RecapEntry {
                team_id: team_id.clone(),
                display_name: self
                    .teams
                    .get(team_id)
                    .map(|team| team.display_name.clone())
                    .unwrap_or_else(|| team_id.clone()),
                payload: submission.payload.clone(),
                submitted_at: submission.submitted_at,
                winner: result.winner_ids.contains(team_id),
            })
            .collect();
        if result.category == CategoryId::Estimation {
            entries.sort_by(|left, right| {
                let left = left.payload.estimate().unwrap_or_default();
                let right = right.payload.estimate().unwrap_or_default();
                left.total_cmp(&right)
            });
        }
        Recap::Submissions { entries }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::state::room::tests::{playing, room_with_teams};

    fn balance(room: &GameRoom, team_id: &str) -> u32 {
        room.teams()
            .get(team_id)
            .map(|team| team.token_balance)
            .unwrap_or_default()
    }

    #[test]
    fn invalid_stakes_are_coerced_to_zero() {
        let mut room = room_with_teams(2);
        room.start_category(CategoryId::Quiz).unwrap();

        for amount in [-3, 1, 4, 9, 12, 1_000] {
            let stake = room.set_stake("t0", amount, false).unwrap();
            assert_eq!(stake.amount, 0, "amount {amount}");
        }
        assert_eq!(room.set_stake("t0", 6, false).unwrap().amount, 6);
    }

    #[test]
    fn nine_is_allowed_with_more_than_two_teams() {
        let mut room = room_with_teams(3);
        room.start_category(CategoryId::Quiz).unwrap();
        assert_eq!(room.set_stake("t0", 9, false).unwrap().amount, 9);
    }

    #[test]
    fn broke_teams_cannot_wager_and_jokers_need_a_stake() {
        let mut room = room_with_teams(2);
        room.start_category(CategoryId::Quiz).unwrap();
        room.teams.debit("t0", 18);

        let stake = room.set_stake("t0", 3, true).unwrap();
        assert_eq!(stake, Stake::default());

        let stake = room.set_stake("t1", 0, true).unwrap();
        assert!(!stake.joker_applied);
    }

    #[test]
    fn stakes_outside_stake_phase_are_rejected() {
        let mut room = room_with_teams(2);
        assert_eq!(room.set_stake("t0", 3, false), Err(Rejection::InvalidPhase));
        room.start_category(CategoryId::Quiz).unwrap();
        assert_eq!(
            room.set_stake("ghost", 3, false).unwrap_err().code(),
            "unknown_team"
        );
    }

    #[test]
    fn lock_debits_and_builds_pot() {
        let mut room = room_with_teams(3);
        room.start_category(CategoryId::Quiz).unwrap();
        room.set_stake("t0", 6, true).unwrap();
        room.set_stake("t1", 3, false).unwrap();

        assert_eq!(room.lock_stakes(), Ok(6 + 6 + 3 + FIXED_POT_BASE));
        assert_eq!(balance(&room, "t0"), 14);
        assert_eq!(balance(&room, "t1"), 17);
        assert_eq!(balance(&room, "t2"), 20);
        assert_eq!(room.teams().get("t0").map(|team| team.joker_count), Some(0));
        assert_eq!(room.teams().get("t1").map(|team| team.joker_count), Some(1));
        assert_eq!(room.phase(), Phase::Category);

        assert!(room.lock_stakes().is_err());
        assert_eq!(room.state().category_pot, 18);
    }

    #[test]
    fn resolve_is_idempotent_per_round() {
        let mut room = playing(CategoryId::Quiz, 2);
        room.state.category_pot = 30;

        room.resolve_round(&["t0".into()], 1).unwrap();
        let err = room.resolve_round(&["t0".into()], 2).unwrap_err();
        assert_eq!(err.code(), "already_resolved");
        assert_eq!(balance(&room, "t0"), 30);
    }

    #[test]
    fn single_winner_takes_payout_and_carry() {
        let mut room = playing(CategoryId::Quiz, 2);
        room.state.category_pot = 30;
        room.state.carry_round = 5;

        let record = room.resolve_round(&["t1".into()], 0).unwrap();
        assert_eq!(record.payout, 10);
        assert_eq!(record.per_winner_share, Some(15));
        assert_eq!(balance(&room, "t1"), 35);
        assert_eq!(room.state().carry_round, 0);
    }

    #[test]
    fn payout_fifteen_plus_carry_five_pays_twenty() {
        let mut room = playing(CategoryId::Quiz, 2);
        room.state.category_pot = 45;
        room.state.carry_round = 5;

        let before = balance(&room, "t0");
        room.resolve_round(&["t0".into()], 0).unwrap();
        assert_eq!(balance(&room, "t0") - before, 20);
    }

    #[test]
    fn no_winner_rolls_payout_forward() {
        let mut room = playing(CategoryId::Quiz, 2);
        room.state.category_pot = 30;
        room.state.carry_round = 4;

        let record = room.resolve_round(&[], 0).unwrap();
        assert_eq!(record.per_winner_share, None);
        assert_eq!(room.state().carry_round, 14);
        assert!(room.state().is_resolved());
    }

    #[test]
    fn tie_splits_and_carries_remainder_when_rounds_remain() {
        let mut room = playing(CategoryId::Quiz, 3);
        room.state.category_pot = 300;

        let winners = ["t0".to_owned(), "t1".to_owned(), "t2".to_owned()];
        let record = room.resolve_round(&winners, 0).unwrap();
        assert_eq!(record.total_pot, 100);
        assert_eq!(record.per_winner_share, Some(33));
        assert_eq!(room.state().carry_round, 1);
        for team_id in &winners {
            assert_eq!(balance(&room, team_id), 53);
        }
    }

    #[test]
    fn final_round_tie_discards_remainder() {
        let mut room = playing(CategoryId::Quiz, 3);
        room.state.category_pot = 300;
        room.next_round().unwrap();
        room.next_round().unwrap();

        let winners = ["t0".to_owned(), "t1".to_owned(), "t2".to_owned()];
        let record = room.resolve_round(&winners, 0).unwrap();
        assert_eq!(record.per_winner_share, Some(33));
        assert_eq!(record.remainder_discarded, 1);
        assert_eq!(room.state().carry_round, 0);
    }

    #[test]
    fn unknown_and_duplicate_winners_are_dropped() {
        let mut room = playing(CategoryId::Quiz, 2);
        room.state.category_pot = 30;

        assert_eq!(
            room.resolve_round(&["ghost".into()], 0).unwrap_err().code(),
            "unknown_team"
        );
        assert!(!room.state().is_resolved());

        let record = room
            .resolve_round(&["t0".into(), "ghost".into(), "t0".into()], 0)
            .unwrap();
        assert_eq!(record.winner_ids, vec!["t0".to_owned()]);
    }

    #[test]
    fn undo_restores_balances_and_reopens_round() {
        let mut room = playing(CategoryId::Quiz, 2);
        room.state.category_pot = 30;
        room.state.carry_round = 2;
        let snapshot = UndoSnapshot {
            token_balances: room
                .teams()
                .iter()
                .map(|team| (team.id.clone(), team.token_balance))
                .collect(),
            carry_round: room.state().carry_round,
        };

        assert_eq!(
            room.undo_round(&snapshot).unwrap_err().code(),
            "not_resolved"
        );

        room.resolve_round(&["t0".into()], 0).unwrap();
        room.undo_round(&snapshot).unwrap();

        assert_eq!(balance(&room, "t0"), 20);
        assert_eq!(room.state().carry_round, 2);
        assert!(!room.state().is_resolved());
        assert!(room.state().pending_result.is_none());
        assert_eq!(
            room.state().category_stats.get("t0").copied(),
            Some(CategoryStats::default())
        );

        room.resolve_round(&["t1".into()], 1).unwrap();
        assert_eq!(balance(&room, "t1"), 32);
    }

    #[test]
    fn announce_publishes_once_with_sorted_estimations() {
        let mut room = playing(CategoryId::Estimation, 3);
        room.submit("t0", CategoryId::Estimation, &json!(50), 0).unwrap();
        room.submit("t1", CategoryId::Estimation, &json!(10), 1).unwrap();
        room.submit("t2", CategoryId::Estimation, &json!(30), 2).unwrap();
        assert_eq!(
            room.announce_result().unwrap_err(),
            Rejection::NothingToAnnounce
        );

        room.resolve_round(&["t2".into()], 3).unwrap();
        let announcement = room.announce_result().unwrap();
        let Recap::Submissions { entries } = announcement.recap else {
            panic!("expected submission recap");
        };
        let order: Vec<_> = entries.iter().map(|entry| entry.team_id.as_str()).collect();
        assert_eq!(order, ["t1", "t2", "t0"]);
        assert!(entries[1].winner);
        assert!(room.announce_result().is_err());
    }

    #[test]
    fn summary_lists_earnings_per_team() {
        let mut room = room_with_teams(2);
        room.start_category(CategoryId::Quiz).unwrap();
        room.set_stake("t1", 6, false).unwrap();
        room.lock_stakes().unwrap();
        room.resolve_round(&["t1".into()], 0).unwrap();

        let summary = room.finish_category().unwrap();
        assert_eq!(summary.category, CategoryId::Quiz);
        assert_eq!(summary.entries[0].team_id, "t1");
        assert_eq!(summary.entries[0].wins, 1);
        assert_eq!(summary.entries[0].earnings, 3);
        assert_eq!(summary.entries[0].net, -3);
        assert!(room.state().stakes.is_empty());
    }
}
