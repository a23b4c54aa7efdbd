//! Race arbitration for the buzzer category.
//!
//! A round starts IDLE. Drawing a label makes the buzzer READY; the first
//! accepted buzz LOCKS it and opens an answer window. The admin then confirms
//! a winner, or re-opens buzzing with `clear_buzz`/`unlock`. An answer window
//! that runs out releases the lock through the scheduler.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::state::{
    game::{ResolutionRecord, TeamId},
    rejection::Rejection,
    room::GameRoom,
    scheduler::TaskKind,
    state_machine::Phase,
};

/// One accepted buzz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuzzEntry {
    /// Buzzing team.
    pub team_id: TeamId,
    /// Instant the buzz was accepted.
    pub ts: u64,
}

/// Label pair offered in one round of the race category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RaceLabels {
    /// Label drawn first.
    pub primary: String,
    /// Fallback once the primary was used.
    pub alternate: String,
}

impl RaceLabels {
    /// Built-in label pairs, one per round.
    pub fn defaults() -> Vec<Self> {
        [
            ("english", "french"),
            ("german", "spanish"),
            ("italian", "dutch"),
        ]
        .into_iter()
        .map(|(primary, alternate)| Self {
            primary: primary.to_owned(),
            alternate: alternate.to_owned(),
        })
        .collect()
    }
}

/// Observable stage of the buzzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuzzerPhase {
    /// Nothing drawn.
    Idle,
    /// Label drawn, buzzing open.
    BuzzReady,
    /// A team holds the buzzer.
    Lock,
}

/// Persisted race state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct BuzzerState {
    /// Label currently drawn.
    pub active_category_id: Option<String>,
    /// Labels drawn at any point this game.
    pub used_category_ids: BTreeSet<String>,
    /// Accepted buzzes of the current draw.
    pub buzz_order: Vec<BuzzEntry>,
    /// Whether buzzing is closed.
    pub locked: bool,
    /// Instant the answer window closes.
    pub answer_window_ends_at: Option<u64>,
    /// Both labels of the round were already used.
    pub exhausted: bool,
    /// Draw counter, used to ignore stale auto-unlocks.
    pub draw: u64,
}

impl BuzzerState {
    /// Current stage.
    pub fn phase(&self) -> BuzzerPhase {
        match (&self.active_category_id, self.locked) {
            (None, _) => BuzzerPhase::Idle,
            (Some(_), false) => BuzzerPhase::BuzzReady,
            (Some(_), true) => BuzzerPhase::Lock,
        }
    }

    /// Back to IDLE for a new round. Used labels and the draw counter survive.
    pub fn rearm(&mut self) {
        self.active_category_id = None;
        self.exhausted = false;
        self.reopen();
    }

    /// Re-open buzzing for the current draw.
    pub fn reopen(&mut self) {
        self.buzz_order.clear();
        self.locked = false;
        self.answer_window_ends_at = None;
    }
}

/// Result of drawing a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawOutcome {
    /// A label is now active.
    Drawn(String),
    /// Both labels were used; the buzzer stays idle.
    Exhausted,
}

impl GameRoom {
    /// Draw the round's label: primary first, alternate once the primary was used.
    pub fn draw_label(&mut self) -> Result<DrawOutcome, Rejection> {
        self.ensure_race_round()?;
        if self.state.buzzer.exhausted {
            return Err(Rejection::BuzzerExhausted);
        }

        let labels = self
            .config
            .race_labels
            .get(self.state.round_index as usize)
            .cloned();
        let buzzer = &mut self.state.buzzer;
        let next = labels.and_then(|labels| {
            [labels.primary, labels.alternate]
                .into_iter()
                .find(|label| !buzzer.used_category_ids.contains(label))
        });

        self.scheduler.cancel(TaskKind::BuzzerAutoUnlock);
        buzzer.draw += 1;
        buzzer.reopen();
        match next {
            Some(label) => {
                buzzer.used_category_ids.insert(label.clone());
                buzzer.active_category_id = Some(label.clone());
                info!(%label, draw = buzzer.draw, "buzzer label drawn");
                Ok(DrawOutcome::Drawn(label))
            }
            None => {
                buzzer.active_category_id = None;
                buzzer.exhausted = true;
                info!(round_index = self.state.round_index, "buzzer labels exhausted");
                Ok(DrawOutcome::Exhausted)
            }
        }
    }

    /// A team hits the buzzer. The first accepted buzz locks it.
    pub fn buzz(&mut self, team_id: &str, now: u64) -> Result<BuzzEntry, Rejection> {
        self.ensure_race_round()?;
        if !self.teams.contains(team_id) {
            return Err(Rejection::unknown_team(team_id));
        }
        if self.state.is_resolved() {
            let round_key = self.current_round_key()?;
            return Err(Rejection::AlreadyResolved { round_key });
        }

        let buzzer = &mut self.state.buzzer;
        if buzzer.active_category_id.is_none() {
            return Err(Rejection::BuzzerIdle);
        }
        if buzzer.buzz_order.iter().any(|entry| entry.team_id == team_id) {
            return Err(Rejection::AlreadyBuzzed);
        }
        if buzzer.locked {
            debug!(team_id, "buzz after lock");
            return Err(Rejection::BuzzerLocked {
                first: buzzer.buzz_order.first().cloned(),
                answer_window_ends_at: buzzer.answer_window_ends_at,
            });
        }

        let entry = BuzzEntry {
            team_id: team_id.to_owned(),
            ts: now,
        };
        let window_end = now + self.config.answer_window_ms;
        buzzer.buzz_order.push(entry.clone());
        buzzer.locked = true;
        buzzer.answer_window_ends_at = Some(window_end);
        let draw = buzzer.draw;
        self.scheduler
            .schedule(TaskKind::BuzzerAutoUnlock, window_end, draw);
        info!(team_id, draw, window_end, "buzz accepted");
        Ok(entry)
    }

    /// Declare the winner of the race round: the named team or the first buzz.
    pub fn confirm_buzz(
        &mut self,
        team_id: Option<&str>,
        now: u64,
    ) -> Result<ResolutionRecord, Rejection> {
        self.ensure_race_round()?;
        let winner = match team_id {
            Some(team_id) => team_id.to_owned(),
            None => self
                .state
                .buzzer
                .buzz_order
                .first()
                .map(|entry| entry.team_id.clone())
                .ok_or(Rejection::NoBuzz)?,
        };
        if !self.teams.contains(&winner) {
            return Err(Rejection::unknown_team(&winner));
        }

        let record = self.resolve_round(&[winner], now)?;
        self.scheduler.cancel(TaskKind::BuzzerAutoUnlock);
        let buzzer = &mut self.state.buzzer;
        buzzer.locked = true;
        buzzer.answer_window_ends_at = None;
        Ok(record)
    }

    /// Re-open buzzing, switching to the alternate label if it is still unused.
    pub fn clear_buzz(&mut self) -> Result<Option<String>, Rejection> {
        self.ensure_race_round()?;
        let labels = self
            .config
            .race_labels
            .get(self.state.round_index as usize)
            .cloned();
        let buzzer = &mut self.state.buzzer;
        let Some(active) = buzzer.active_category_id.clone() else {
            return Err(Rejection::BuzzerIdle);
        };

        buzzer.reopen();
        let alternate = labels
            .filter(|labels| active == labels.primary)
            .map(|labels| labels.alternate)
            .filter(|alternate| !buzzer.used_category_ids.contains(alternate));
        if let Some(alternate) = alternate {
            buzzer.used_category_ids.insert(alternate.clone());
            buzzer.active_category_id = Some(alternate);
        }
        self.scheduler.cancel(TaskKind::BuzzerAutoUnlock);
        Ok(self.state.buzzer.active_category_id.clone())
    }

    /// Re-open buzzing on the same label.
    pub fn unlock_buzzer(&mut self) -> Result<(), Rejection> {
        self.ensure_race_round()?;
        self.state.buzzer.reopen();
        self.scheduler.cancel(TaskKind::BuzzerAutoUnlock);
        Ok(())
    }

    /// Force the lock on, or release it like [`GameRoom::unlock_buzzer`].
    pub fn set_buzzer_lock(&mut self, locked: bool) -> Result<(), Rejection> {
        if !locked {
            return self.unlock_buzzer();
        }
        self.ensure_race_round()?;
        self.state.buzzer.locked = true;
        self.state.buzzer.answer_window_ends_at = None;
        self.scheduler.cancel(TaskKind::BuzzerAutoUnlock);
        Ok(())
    }

    /// Release an unanswered lock once its window has passed.
    ///
    /// Called from the scheduler, so every precondition is checked again.
    pub(super) fn auto_unlock_buzzer(&mut self, draw: u64, now: u64) -> bool {
        if self.ensure_race_round().is_err() || self.state.is_resolved() {
            return false;
        }
        let buzzer = &mut self.state.buzzer;
        let expired = buzzer
            .answer_window_ends_at
            .is_some_and(|window_end| window_end <= now);
        if !buzzer.locked || buzzer.draw != draw || !expired {
            return false;
        }
        buzzer.reopen();
        info!(draw, "answer window elapsed, buzzer unlocked");
        true
    }

    fn ensure_race_round(&self) -> Result<(), Rejection> {
        if self.phase() != Phase::Category {
            return Err(Rejection::InvalidPhase);
        }
        if !self.current_category()?.is_race() {
            return Err(Rejection::NotRaceCategory);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{
        category::CategoryId,
        room::{TickEffect, tests::playing},
    };

    fn race() -> GameRoom {
        let mut room = playing(CategoryId::BuzzerRace, 3);
        room.draw_label().unwrap();
        room
    }

    #[test]
    fn buzzing_needs_the_race_category_and_a_draw() {
        let mut room = playing(CategoryId::Quiz, 2);
        assert_eq!(room.buzz("t0", 0), Err(Rejection::NotRaceCategory));

        let mut room = playing(CategoryId::BuzzerRace, 2);
        assert_eq!(room.buzz("t0", 0), Err(Rejection::BuzzerIdle));
        assert_eq!(room.state().buzzer.phase(), BuzzerPhase::Idle);
    }

    #[test]
    fn first_buzz_locks_and_later_buzzes_learn_who_was_first() {
        let mut room = race();
        assert_eq!(room.state().buzzer.phase(), BuzzerPhase::BuzzReady);

        room.buzz("t0", 1_000).unwrap();
        assert_eq!(room.state().buzzer.phase(), BuzzerPhase::Lock);
        assert_eq!(room.state().buzzer.answer_window_ends_at, Some(46_000));

        let err = room.buzz("t1", 1_050).unwrap_err();
        assert_eq!(
            err,
            Rejection::BuzzerLocked {
                first: Some(BuzzEntry {
                    team_id: "t0".into(),
                    ts: 1_000
                }),
                answer_window_ends_at: Some(46_000),
            }
        );
        assert_eq!(room.buzz("t0", 1_100), Err(Rejection::AlreadyBuzzed));
        assert_eq!(room.state().buzzer.buzz_order.len(), 1);
    }

    #[test]
    fn lock_auto_clears_after_answer_window() {
        let mut room = race();
        room.buzz("t0", 0).unwrap();

        assert!(room.run_due(44_999).is_empty());
        let effects = room.run_due(45_000);
        assert_eq!(effects, vec![TickEffect::BuzzerUnlocked { draw: 1 }]);
        assert_eq!(room.state().buzzer.phase(), BuzzerPhase::BuzzReady);
        assert!(room.state().buzzer.buzz_order.is_empty());

        room.buzz("t1", 46_000).unwrap();
    }

    #[test]
    fn stale_auto_unlock_is_ignored() {
        let mut room = race();
        room.buzz("t0", 0).unwrap();
        room.draw_label().unwrap();
        room.buzz("t1", 10_000).unwrap();

        assert!(!room.auto_unlock_buzzer(1, 60_000));
        assert!(room.state().buzzer.locked);
    }

    #[test]
    fn confirm_pays_first_buzz_and_cancels_unlock() {
        let mut room = race();
        room.state.category_pot = 30;
        room.buzz("t2", 0).unwrap();

        let record = room.confirm_buzz(None, 5_000).unwrap();
        assert_eq!(record.winner_ids, vec!["t2".to_owned()]);
        assert!(room.state().buzzer.locked);
        assert_eq!(room.state().buzzer.answer_window_ends_at, None);
        assert!(room.run_due(100_000).is_empty());

        assert_eq!(
            room.buzz("t1", 6_000).unwrap_err().code(),
            "already_resolved"
        );
        assert_eq!(
            room.confirm_buzz(Some("t1"), 7_000).unwrap_err().code(),
            "already_resolved"
        );
    }

    #[test]
    fn confirm_without_buzz_needs_a_team() {
        let mut room = race();
        assert_eq!(room.confirm_buzz(None, 0), Err(Rejection::NoBuzz));
        assert!(room.confirm_buzz(Some("t1"), 0).is_ok());
    }

    #[test]
    fn clear_buzz_toggles_to_alternate_once() {
        let mut room = race();
        room.buzz("t0", 0).unwrap();

        assert_eq!(room.clear_buzz(), Ok(Some("french".to_owned())));
        assert!(room.state().buzzer.buzz_order.is_empty());
        assert!(!room.state().buzzer.locked);
        assert_eq!(room.clear_buzz(), Ok(Some("french".to_owned())));
    }

    #[test]
    fn unlock_keeps_label_and_set_lock_has_no_window() {
        let mut room = race();
        room.buzz("t0", 0).unwrap();
        room.unlock_buzzer().unwrap();
        assert_eq!(
            room.state().buzzer.active_category_id.as_deref(),
            Some("english")
        );
        assert!(room.scheduler().pending(TaskKind::BuzzerAutoUnlock).is_none());

        room.set_buzzer_lock(true).unwrap();
        assert_eq!(room.state().buzzer.phase(), BuzzerPhase::Lock);
        assert_eq!(room.state().buzzer.answer_window_ends_at, None);
        room.set_buzzer_lock(false).unwrap();
        assert_eq!(room.state().buzzer.phase(), BuzzerPhase::BuzzReady);
    }

    #[test]
    fn labels_fall_back_then_exhaust() {
        let mut room = race();
        assert_eq!(room.draw_label(), Ok(DrawOutcome::Drawn("french".into())));
        assert_eq!(room.draw_label(), Ok(DrawOutcome::Exhausted));
        assert!(room.state().buzzer.exhausted);
        assert_eq!(room.draw_label(), Err(Rejection::BuzzerExhausted));

        room.next_round().unwrap();
        assert_eq!(room.draw_label(), Ok(DrawOutcome::Drawn("german".into())));
        assert_eq!(room.state().buzzer.used_category_ids.len(), 3);
    }
}
