use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::category::CategoryId;

/// High-level phases a room can be in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Teams join and the admin picks the next category.
    #[default]
    Lobby,
    /// Teams place their wagers on the chosen category.
    Stake,
    /// Rounds of the category are being played.
    Category,
    /// Every category of the catalogue has been played.
    Finished,
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// Admin opens a category for wagering.
    StartCategory(CategoryId),
    /// Stakes are locked into the pot; rounds begin.
    LockStakes,
    /// The category is complete; `game_complete` is set when nothing is left to play.
    FinishCategory {
        /// Whether every category has now been played.
        game_complete: bool,
    },
    /// Unconditional abort back to the lobby.
    GotoLobby,
    /// Wipe the whole room.
    FullReset,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: Phase,
    /// The event that cannot be applied from this phase.
    pub event: GameEvent,
}

/// Phase machine driving the room: LOBBY → STAKE → CATEGORY → LOBBY/FINISHED.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameStateMachine {
    phase: Phase,
    version: u64,
}

impl GameStateMachine {
    /// Create a new state machine initialised in the lobby.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Apply an event, moving to the next phase when it is valid.
    pub fn apply(&mut self, event: GameEvent) -> Result<Phase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        self.version += 1;
        Ok(next)
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(&self, event: GameEvent) -> Result<Phase, InvalidTransition> {
        let next = match (self.phase, event) {
            (Phase::Lobby, GameEvent::StartCategory(_)) => Phase::Stake,
            (Phase::Stake, GameEvent::LockStakes) => Phase::Category,
            (Phase::Category, GameEvent::FinishCategory { game_complete }) => {
                if game_complete {
                    Phase::Finished
                } else {
                    Phase::Lobby
                }
            }
            (_, GameEvent::GotoLobby) | (_, GameEvent::FullReset) => Phase::Lobby,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut GameStateMachine, event: GameEvent) -> Phase {
        sm.apply(event).unwrap()
    }

    #[test]
    fn initial_state_is_lobby() {
        let sm = GameStateMachine::new();
        assert_eq!(sm.phase(), Phase::Lobby);
        assert_eq!(sm.version(), 0);
    }

    #[test]
    fn full_happy_path_through_category() {
        let mut sm = GameStateMachine::new();

        assert_eq!(
            apply(&mut sm, GameEvent::StartCategory(CategoryId::Quiz)),
            Phase::Stake
        );
        assert_eq!(apply(&mut sm, GameEvent::LockStakes), Phase::Category);
        assert_eq!(
            apply(
                &mut sm,
                GameEvent::FinishCategory {
                    game_complete: false
                }
            ),
            Phase::Lobby
        );
        assert_eq!(sm.version(), 3);
    }

    #[test]
    fn last_category_finishes_the_game() {
        let mut sm = GameStateMachine::new();
        apply(&mut sm, GameEvent::StartCategory(CategoryId::Ranking));
        apply(&mut sm, GameEvent::LockStakes);
        assert_eq!(
            apply(
                &mut sm,
                GameEvent::FinishCategory {
                    game_complete: true
                }
            ),
            Phase::Finished
        );

        let err = sm
            .apply(GameEvent::StartCategory(CategoryId::Quiz))
            .unwrap_err();
        assert_eq!(err.from, Phase::Finished);
        assert_eq!(apply(&mut sm, GameEvent::GotoLobby), Phase::Lobby);
    }

    #[test]
    fn invalid_transition_returns_error() {
        let mut sm = GameStateMachine::new();
        let err = sm.apply(GameEvent::LockStakes).unwrap_err();
        assert_eq!(err.from, Phase::Lobby);
        assert_eq!(err.event, GameEvent::LockStakes);
        assert_eq!(sm.version(), 0);
    }

    #[test]
    fn abort_and_reset_work_from_any_phase() {
        let mut sm = GameStateMachine::new();
        apply(&mut sm, GameEvent::StartCategory(CategoryId::Estimation));
        assert_eq!(apply(&mut sm, GameEvent::GotoLobby), Phase::Lobby);

        apply(&mut sm, GameEvent::StartCategory(CategoryId::Estimation));
        apply(&mut sm, GameEvent::LockStakes);
        assert_eq!(apply(&mut sm, GameEvent::FullReset), Phase::Lobby);
    }
}
