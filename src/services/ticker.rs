//! Periodic scheduler tick: timer expiry and buzzer auto-unlock.

use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use crate::{
    services::sse_events,
    state::{SharedState, TickEffect},
};

/// Drive the room's deadline queue every `tick_interval`.
pub async fn run(state: SharedState) {
    let mut ticker = interval(state.config().tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        tick(&state).await;
    }
}

/// Run every due deadline once and broadcast what changed.
pub async fn tick(state: &SharedState) -> Vec<TickEffect> {
    let now = state.now_ms();
    let effects = state
        .with_room_mut(|room| {
            let effects = room.run_due(now);
            if !effects.is_empty() {
                sse_events::broadcast_state(state, room, now);
            }
            effects
        })
        .await;

    if !effects.is_empty() {
        debug!(?effects, "scheduled tasks fired");
        state.schedule_persist();
    }
    effects
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        services::command_service::{
            Actor, execute,
            tests::{command, test_state},
        },
        services::sse_events::EVENT_STATE_UPDATE,
        state::buzzer::BuzzerPhase,
    };

    #[tokio::test]
    async fn unanswered_buzz_is_released_after_the_answer_window() {
        let (state, clock, _store) = test_state();
        for team in ["a", "b"] {
            let join = json!({ "type": "team.join", "name": team });
            assert!(execute(&state, &Actor::team(team), command(join)).await.ok);
        }
        for raw in [
            json!({ "type": "admin.startCategory", "categoryId": "buzzer_race" }),
            json!({ "type": "admin.lockStakes" }),
            json!({ "type": "admin.buzzer.draw" }),
        ] {
            assert!(execute(&state, &Actor::admin(), command(raw)).await.ok);
        }
        let buzz = json!({ "type": "team.buzz" });
        assert!(execute(&state, &Actor::team("a"), command(buzz.clone())).await.ok);

        clock.advance(44_999);
        assert!(tick(&state).await.is_empty());

        let mut events = state.public_sse().subscribe();
        clock.advance(1);
        assert_eq!(tick(&state).await.len(), 1);
        assert_eq!(
            events.try_recv().unwrap().event.as_deref(),
            Some(EVENT_STATE_UPDATE)
        );
        let phase = state.with_room(|room| room.state().buzzer.phase()).await;
        assert_eq!(phase, BuzzerPhase::BuzzReady);

        // Team b can now take the buzzer.
        assert!(execute(&state, &Actor::team("b"), command(buzz)).await.ok);
    }

    #[tokio::test]
    async fn timer_expiry_is_recorded_by_the_tick() {
        let (state, clock, _store) = test_state();
        let start = json!({ "type": "admin.timer.start", "seconds": 5 });
        assert!(execute(&state, &Actor::admin(), command(start)).await.ok);

        clock.advance(5_000);
        let effects = tick(&state).await;
        assert_eq!(effects, vec![TickEffect::TimerExpired { at: 6_000 }]);
        let timer = state.with_room(|room| room.state().timer.clone()).await;
        assert_eq!(timer.ends_at, None);
        assert_eq!(timer.last_expired_at, Some(6_000));
    }
}
