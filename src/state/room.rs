//! The game room: one owned aggregate holding every piece of engine state.
//!
//! All operations take the current instant explicitly and either mutate the
//! room and return what changed, or return a [`Rejection`] and leave the room
//! untouched. Wagering lives in [`super::ledger`], race arbitration in
//! [`super::buzzer`].

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::state::{
    buzzer::RaceLabels,
    category::{CategoryId, SubmissionPayload},
    game::{GameState, ROUNDS_PER_CATEGORY, Submission, Team, round_key},
    idempotency::{DEFAULT_IDEMPOTENCY_WINDOW_MS, IdempotencyGuard},
    ledger::CategorySummary,
    rejection::Rejection,
    scheduler::{Scheduler, TaskKind},
    state_machine::{GameEvent, Phase},
    teams::{TeamPatch, TeamRegistry},
};

/// Engine tunables derived from the application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConfig {
    /// Tokens granted to a new team.
    pub starting_tokens: u32,
    /// Jokers granted to a new team.
    pub starting_jokers: u32,
    /// Time a buzzing team has to answer before the lock is released.
    pub answer_window_ms: u64,
    /// How long after expiry late submissions are still honoured.
    pub grace_window_ms: u64,
    /// Deduplication window for client action ids.
    pub idempotency_window_ms: u64,
    /// Label pair drawn in each round of the race category.
    pub race_labels: Vec<RaceLabels>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            starting_tokens: 20,
            starting_jokers: 1,
            answer_window_ms: 45_000,
            grace_window_ms: 500,
            idempotency_window_ms: DEFAULT_IDEMPOTENCY_WINDOW_MS,
            race_labels: RaceLabels::defaults(),
        }
    }
}

/// Something a background tick changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickEffect {
    /// The countdown ran out at the given instant.
    TimerExpired {
        /// Former deadline.
        at: u64,
    },
    /// An unanswered buzz lock was released.
    BuzzerUnlocked {
        /// Draw the lock belonged to.
        draw: u64,
    },
}

/// Single game room.
#[derive(Debug, Clone)]
pub struct GameRoom {
    pub(super) state: GameState,
    pub(super) teams: TeamRegistry,
    pub(super) scheduler: Scheduler,
    pub(super) config: RoomConfig,
    guard: IdempotencyGuard,
}

impl GameRoom {
    /// Fresh room in the lobby.
    pub fn new(config: RoomConfig) -> Self {
        Self {
            guard: IdempotencyGuard::new(config.idempotency_window_ms),
            state: GameState::default(),
            teams: TeamRegistry::default(),
            scheduler: Scheduler::default(),
            config,
        }
    }

    /// Rebuild a room from persisted state.
    ///
    /// Entries pointing at unknown teams are dropped and pending deadlines are
    /// re-armed from the timer and buzzer fields.
    pub fn restore(config: RoomConfig, mut state: GameState, teams: TeamRegistry) -> Self {
        let before = state.stakes.len()
            + state.submissions.len()
            + state.category_stats.len()
            + state.buzzer.buzz_order.len();
        state.stakes.retain(|team_id, _| teams.contains(team_id));
        state.submissions.retain(|team_id, _| teams.contains(team_id));
        state
            .category_stats
            .retain(|team_id, _| teams.contains(team_id));
        state
            .buzzer
            .buzz_order
            .retain(|entry| teams.contains(&entry.team_id));
        let after = state.stakes.len()
            + state.submissions.len()
            + state.category_stats.len()
            + state.buzzer.buzz_order.len();
        if after < before {
            warn!(dropped = before - after, "dropped snapshot entries of unknown teams");
        }

        let mut room = Self {
            guard: IdempotencyGuard::new(config.idempotency_window_ms),
            state,
            teams,
            scheduler: Scheduler::default(),
            config,
        };

        if matches!(room.phase(), Phase::Stake | Phase::Category)
            && room.state.current_category.is_none()
        {
            warn!(phase = ?room.phase(), "snapshot has no category, returning to lobby");
            room.goto_lobby();
        }

        if let Some(ends_at) = room.state.timer.ends_at {
            room.scheduler.schedule(TaskKind::TimerExpiry, ends_at, 0);
        }
        if let (true, Some(window_end)) = (
            room.state.buzzer.locked,
            room.state.buzzer.answer_window_ends_at,
        ) {
            room.scheduler.schedule(
                TaskKind::BuzzerAutoUnlock,
                window_end,
                room.state.buzzer.draw,
            );
        }

        room
    }

    /// Read-only view of the game state.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Read-only view of the team registry.
    pub fn teams(&self) -> &TeamRegistry {
        &self.teams
    }

    /// Pending deadlines.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Engine tunables.
    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Number of remembered action ids.
    pub fn idempotency_entries(&self) -> usize {
        self.guard.len()
    }

    /// Returns `false` when this action id was already applied recently.
    pub fn admit_action(&mut self, actor: &str, action_id: Option<&str>, now: u64) -> bool {
        self.guard.admit(actor, action_id, now)
    }

    /// Register or refresh a team.
    pub fn join_team(
        &mut self,
        team_id: &str,
        name: &str,
        avatar_ref: Option<String>,
        now: u64,
    ) -> (Team, bool) {
        let (team, created) = self.teams.join(
            team_id,
            name,
            avatar_ref,
            self.config.starting_tokens,
            self.config.starting_jokers,
            now,
        );
        if created {
            info!(team_id = %team.id, name = %team.display_name, "team joined");
        }
        (team, created)
    }

    /// Apply an admin edit to a team.
    pub fn update_team(&mut self, team_id: &str, patch: TeamPatch) -> Result<Team, Rejection> {
        self.teams
            .update(team_id, patch)
            .ok_or_else(|| Rejection::unknown_team(team_id))
    }

    /// Remove a team and every per-team entry referencing it.
    ///
    /// A locked pot is not refunded.
    pub fn kick_team(&mut self, team_id: &str) -> Result<Team, Rejection> {
        let team = self
            .teams
            .remove(team_id)
            .ok_or_else(|| Rejection::unknown_team(team_id))?;
        self.state.stakes.shift_remove(team_id);
        self.state.submissions.shift_remove(team_id);
        self.state.category_stats.shift_remove(team_id);
        self.state
            .buzzer
            .buzz_order
            .retain(|entry| entry.team_id != team_id);
        info!(team_id, "team kicked");
        Ok(team)
    }

    /// LOBBY → STAKE for the given category.
    pub fn start_category(&mut self, category: CategoryId) -> Result<(), Rejection> {
        self.state
            .machine
            .apply(GameEvent::StartCategory(category))?;
        self.clear_category();
        self.state.current_category = Some(category);
        info!(%category, "category started");
        Ok(())
    }

    /// Move to the next round of the category.
    pub fn next_round(&mut self) -> Result<u32, Rejection> {
        self.ensure_phase(Phase::Category)?;
        if self.state.is_final_round() {
            return Err(Rejection::RoundOutOfRange);
        }
        self.enter_round(self.state.round_index + 1)
    }

    /// Move back to the previous round of the category.
    pub fn prev_round(&mut self) -> Result<u32, Rejection> {
        self.ensure_phase(Phase::Category)?;
        let Some(previous) = self.state.round_index.checked_sub(1) else {
            return Err(Rejection::RoundOutOfRange);
        };
        self.enter_round(previous)
    }

    /// CATEGORY → LOBBY (or FINISHED once every category was played).
    ///
    /// The summary is computed before the category state is cleared.
    pub fn finish_category(&mut self) -> Result<CategorySummary, Rejection> {
        self.ensure_phase(Phase::Category)?;
        let category = self.current_category()?;
        let summary = self.category_summary(category);

        let game_complete = CategoryId::ALL
            .iter()
            .all(|id| *id == category || self.state.played_categories.contains(id));
        self.state
            .machine
            .apply(GameEvent::FinishCategory { game_complete })?;
        self.state.played_categories.insert(category);
        if summary.unpaid_carry > 0 {
            info!(%category, unpaid = summary.unpaid_carry, "category finished with unpaid carry");
        }
        self.clear_category();
        info!(%category, game_complete, "category finished");
        Ok(summary)
    }

    /// Abort whatever is running and return to the lobby.
    pub fn goto_lobby(&mut self) {
        if let Err(err) = self.state.machine.apply(GameEvent::GotoLobby) {
            warn!(error = %err, "lobby transition refused");
        }
        self.clear_category();
    }

    /// Drop every team and every piece of game state.
    pub fn full_reset(&mut self) {
        let mut machine = std::mem::take(&mut self.state.machine);
        if let Err(err) = machine.apply(GameEvent::FullReset) {
            warn!(error = %err, "reset transition refused");
        }
        self.state = GameState {
            machine,
            ..GameState::default()
        };
        self.teams.clear();
        self.scheduler.clear();
        info!("room reset");
    }

    /// Store (or overwrite) a team's answer for the current round.
    pub fn submit(
        &mut self,
        team_id: &str,
        category: CategoryId,
        raw: &Value,
        now: u64,
    ) -> Result<Submission, Rejection> {
        self.ensure_phase(Phase::Category)?;
        if self.state.current_category != Some(category) {
            return Err(Rejection::InvalidPhase);
        }
        if !self.teams.contains(team_id) {
            return Err(Rejection::unknown_team(team_id));
        }
        if self.state.is_resolved() {
            return Err(Rejection::SubmissionClosed);
        }
        if !self
            .state
            .timer
            .accepts_action(now, self.config.grace_window_ms)
        {
            debug!(team_id, "late submission dropped");
            return Err(Rejection::SubmissionClosed);
        }

        let payload = SubmissionPayload::normalize(category, raw)?;
        let submission = Submission {
            payload,
            submitted_at: now,
        };
        self.state
            .submissions
            .insert(team_id.to_owned(), submission.clone());
        Ok(submission)
    }

    /// Start the countdown and return its deadline.
    pub fn start_timer(&mut self, seconds: u32, now: u64) -> u64 {
        let ends_at = self.state.timer.start(seconds, now);
        self.scheduler.schedule(TaskKind::TimerExpiry, ends_at, 0);
        ends_at
    }

    /// Freeze the countdown. Stopping an idle timer changes nothing.
    pub fn stop_timer(&mut self, now: u64) -> bool {
        let stopped = self.state.timer.stop(now);
        self.scheduler.cancel(TaskKind::TimerExpiry);
        stopped
    }

    /// Continue a frozen countdown.
    pub fn resume_timer(&mut self, now: u64) -> Result<u64, Rejection> {
        let ends_at = self.state.timer.resume(now)?;
        self.scheduler.schedule(TaskKind::TimerExpiry, ends_at, 0);
        Ok(ends_at)
    }

    /// Clear the countdown.
    pub fn reset_timer(&mut self) {
        self.state.timer.reset();
        self.scheduler.cancel(TaskKind::TimerExpiry);
    }

    /// Run every due deadline, re-validating each against the current state.
    pub fn run_due(&mut self, now: u64) -> Vec<TickEffect> {
        let mut effects = Vec::new();
        for (kind, deadline) in self.scheduler.take_due(now) {
            match kind {
                TaskKind::TimerExpiry => {
                    let previous = self.state.timer.ends_at;
                    if self.state.timer.check_expiry(now) {
                        effects.push(TickEffect::TimerExpired {
                            at: previous.unwrap_or(deadline.at),
                        });
                    } else if let Some(ends_at) = self.state.timer.ends_at {
                        self.scheduler.schedule(TaskKind::TimerExpiry, ends_at, 0);
                    }
                }
                TaskKind::BuzzerAutoUnlock => {
                    if self.auto_unlock_buzzer(deadline.context, now) {
                        effects.push(TickEffect::BuzzerUnlocked {
                            draw: deadline.context,
                        });
                    }
                }
            }
        }
        effects
    }

    pub(super) fn ensure_phase(&self, expected: Phase) -> Result<(), Rejection> {
        if self.phase() == expected {
            Ok(())
        } else {
            Err(Rejection::InvalidPhase)
        }
    }

    pub(super) fn current_category(&self) -> Result<CategoryId, Rejection> {
        self.state
            .current_category
            .ok_or(Rejection::InvalidPhase)
    }

    pub(super) fn current_round_key(&self) -> Result<String, Rejection> {
        self.current_category()
            .map(|category| round_key(category, self.state.round_index))
    }

    fn enter_round(&mut self, round_index: u32) -> Result<u32, Rejection> {
        debug_assert!(round_index < ROUNDS_PER_CATEGORY);
        self.state.round_index = round_index;
        let key = self.current_round_key()?;
        self.state.resolved_rounds.remove(&key);
        self.reset_round_context();
        debug!(round_index, "entered round");
        Ok(round_index)
    }

    /// Clear everything that only lives for one round.
    pub(super) fn reset_round_context(&mut self) {
        self.state.submissions.clear();
        self.state.pending_result = None;
        self.state.last_result = None;
        self.state.timer.reset();
        self.state.buzzer.rearm();
        self.scheduler.clear();
    }

    fn clear_category(&mut self) {
        self.state.current_category = None;
        self.state.round_index = 0;
        self.state.stakes.clear();
        self.state.category_pot = 0;
        self.state.carry_round = 0;
        self.state.category_stats.clear();
        self.state.resolved_rounds.clear();
        self.reset_round_context();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;

    use super::*;

    pub(crate) fn room_with_teams(count: usize) -> GameRoom {
        let mut room = GameRoom::new(RoomConfig::default());
        for index in 0..count {
            let id = format!("t{index}");
            room.join_team(&id, &format!("Team {index}"), None, 0);
        }
        room
    }

    pub(crate) fn playing(category: CategoryId, teams: usize) -> GameRoom {
        let mut room = room_with_teams(teams);
        room.start_category(category).unwrap();
        room.lock_stakes().unwrap();
        room
    }

    #[test]
    fn start_category_resets_category_state() {
        let mut room = room_with_teams(2);
        room.start_category(CategoryId::Quiz).unwrap();
        room.set_stake("t0", 3, false).unwrap();
        room.goto_lobby();

        assert_eq!(room.phase(), Phase::Lobby);
        assert!(room.state().stakes.is_empty());
        assert_eq!(room.state().current_category, None);

        room.start_category(CategoryId::Estimation).unwrap();
        assert_eq!(room.phase(), Phase::Stake);
        assert_eq!(room.state().round_index, 0);
        assert_eq!(room.state().current_category, Some(CategoryId::Estimation));
    }

    #[test]
    fn start_category_outside_lobby_is_rejected() {
        let mut room = playing(CategoryId::Quiz, 2);
        let err = room.start_category(CategoryId::Ranking).unwrap_err();
        assert_eq!(err.code(), "invalid_transition");
        assert_eq!(room.state().current_category, Some(CategoryId::Quiz));
    }

    #[test]
    fn round_navigation_is_bounded_and_unresolves() {
        let mut room = playing(CategoryId::Quiz, 2);
        assert_eq!(room.prev_round(), Err(Rejection::RoundOutOfRange));

        room.resolve_round(&["t0".into()], 10).unwrap();
        assert_eq!(room.next_round(), Ok(1));
        assert_eq!(room.next_round(), Ok(2));
        assert_eq!(room.next_round(), Err(Rejection::RoundOutOfRange));

        assert_eq!(room.prev_round(), Ok(1));
        assert_eq!(room.prev_round(), Ok(0));
        assert!(!room.state().is_resolved());
    }

    #[test]
    fn finishing_every_category_ends_the_game() {
        let mut room = room_with_teams(2);
        for (index, category) in CategoryId::ALL.iter().enumerate() {
            room.start_category(*category).unwrap();
            room.lock_stakes().unwrap();
            room.finish_category().unwrap();
            let expected = if index + 1 == CategoryId::ALL.len() {
                Phase::Finished
            } else {
                Phase::Lobby
            };
            assert_eq!(room.phase(), expected);
        }
        assert!(room.start_category(CategoryId::Quiz).is_err());
        room.goto_lobby();
        assert!(room.start_category(CategoryId::Quiz).is_ok());
    }

    #[test]
    fn full_reset_clears_teams_and_labels() {
        let mut room = playing(CategoryId::BuzzerRace, 2);
        room.draw_label().unwrap();
        room.full_reset();

        assert_eq!(room.phase(), Phase::Lobby);
        assert!(room.teams().is_empty());
        assert!(room.state().buzzer.used_category_ids.is_empty());
        assert!(room.scheduler().entries().is_empty());
    }

    #[test]
    fn submissions_overwrite_and_respect_grace_window() {
        let mut room = playing(CategoryId::Estimation, 2);
        room.submit("t0", CategoryId::Estimation, &json!({"value": 5}), 0)
            .unwrap();
        room.submit("t0", CategoryId::Estimation, &json!({"value": 8}), 10)
            .unwrap();
        assert_eq!(room.state().submissions.len(), 1);

        room.start_timer(1, 1_000);
        assert!(
            room.submit("t1", CategoryId::Estimation, &json!(3), 2_400)
                .is_ok()
        );
        assert_eq!(
            room.submit("t1", CategoryId::Estimation, &json!(4), 2_600),
            Err(Rejection::SubmissionClosed)
        );
        assert_eq!(
            room.submit("ghost", CategoryId::Estimation, &json!(4), 0)
                .unwrap_err()
                .code(),
            "unknown_team"
        );
        assert_eq!(
            room.submit("t1", CategoryId::Quiz, &json!("x"), 0),
            Err(Rejection::InvalidPhase)
        );
    }

    #[test]
    fn tick_expires_timer_once() {
        let mut room = playing(CategoryId::Quiz, 2);
        room.start_timer(2, 1_000);
        assert!(room.run_due(2_000).is_empty());
        assert_eq!(
            room.run_due(3_100),
            vec![TickEffect::TimerExpired { at: 3_000 }]
        );
        assert_eq!(room.state().timer.last_expired_at, Some(3_000));
        assert!(room.run_due(4_000).is_empty());
    }

    #[test]
    fn stopped_timer_never_expires() {
        let mut room = playing(CategoryId::Quiz, 2);
        room.start_timer(2, 0);
        assert!(room.stop_timer(500));
        assert!(room.run_due(10_000).is_empty());
        let ends_at = room.resume_timer(10_000).unwrap();
        assert_eq!(ends_at, 12_000);
        assert_eq!(room.run_due(12_000).len(), 1);
    }

    #[test]
    fn kick_removes_team_entries() {
        let mut room = room_with_teams(3);
        room.start_category(CategoryId::Quiz).unwrap();
        room.set_stake("t1", 3, false).unwrap();
        room.kick_team("t1").unwrap();
        assert!(!room.state().stakes.contains_key("t1"));
        assert_eq!(
            room.kick_team("t1").unwrap_err().code(),
            "unknown_team"
        );
    }

    #[test]
    fn restore_drops_dangling_entries_and_rearms_deadlines() {
        let mut room = playing(CategoryId::Quiz, 2);
        room.start_timer(30, 1_000);
        let mut state = room.state().clone();
        state.submissions.insert(
            "ghost".into(),
            Submission {
                payload: SubmissionPayload::Quiz { answer: "x".into() },
                submitted_at: 0,
            },
        );

        let restored = GameRoom::restore(RoomConfig::default(), state, room.teams().clone());
        assert!(!restored.state().submissions.contains_key("ghost"));
        assert_eq!(
            restored
                .scheduler()
                .pending(TaskKind::TimerExpiry)
                .map(|deadline| deadline.at),
            Some(31_000)
        );
    }
}
