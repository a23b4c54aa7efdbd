//! Applies client commands to the room.
//!
//! Every command goes through the same path: role check, idempotency guard,
//! engine call, broadcasts, persistence request, acknowledgement. All of it
//! except the persistence write happens while the room is held, so events
//! leave in the order the mutations were applied.

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::{
    dto::{
        common::TeamSummary,
        sse::ResetKind,
        ws::{ClientCommand, ClientRole, CommandAck, CommandEnvelope},
    },
    services::sse_events,
    state::{
        AppState, GameRoom, Rejection, SharedState,
        buzzer::DrawOutcome,
        category::CategoryId,
        game::TeamId,
        ledger::{Announcement, CategorySummary},
        timer::{MAX_TIMER_SECS, MIN_TIMER_SECS},
    },
};

/// Countdown used when `admin.timer.start` carries no usable number.
pub const DEFAULT_TIMER_SECS: u32 = 30;

const ADMIN_ACTOR: &str = "admin";
const UNAUTHORIZED: &str = "unauthorized";

/// Who issued a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Channel role the command arrived with.
    pub role: ClientRole,
    /// Identity team commands act on.
    pub team_id: Option<TeamId>,
}

impl Actor {
    /// Operator, whichever channel it uses.
    pub fn admin() -> Self {
        Self {
            role: ClientRole::Admin,
            team_id: None,
        }
    }

    /// Team connection acting as `team_id`.
    pub fn team(team_id: impl Into<TeamId>) -> Self {
        Self {
            role: ClientRole::Team,
            team_id: Some(team_id.into()),
        }
    }

    /// Namespace of this actor's action ids.
    ///
    /// Team scopes carry a prefix so no client token can collide with the
    /// admin scope.
    fn idempotency_scope(&self) -> String {
        match &self.team_id {
            Some(team_id) => format!("team:{team_id}"),
            None => ADMIN_ACTOR.to_string(),
        }
    }
}

/// Side effects of an applied command, broadcast after it.
#[derive(Default)]
struct Applied {
    data: Option<Value>,
    teams_changed: bool,
    announcement: Option<Announcement>,
    summary: Option<CategorySummary>,
    reset: Option<ResetKind>,
}

impl Applied {
    fn with_data(data: impl Serialize) -> Self {
        Self {
            data: serde_json::to_value(data).ok(),
            ..Self::default()
        }
    }

    fn teams_changed(mut self) -> Self {
        self.teams_changed = true;
        self
    }
}

/// Apply one command for `actor` and build its acknowledgement.
pub async fn execute(
    state: &SharedState,
    actor: &Actor,
    envelope: CommandEnvelope,
) -> CommandAck {
    let CommandEnvelope { action_id, command } = envelope;
    let name = command.name();

    if command.required_role() != actor.role {
        debug!(command = name, role = ?actor.role, "command refused for role");
        return CommandAck::rejected(action_id, UNAUTHORIZED, None);
    }

    let now = state.now_ms();
    let ack = state
        .with_room_mut(|room| {
            if !room.admit_action(&actor.idempotency_scope(), action_id.as_deref(), now) {
                debug!(command = name, action_id = ?action_id, "duplicate action ignored");
                return CommandAck::duplicate(action_id.clone());
            }

            match apply(room, actor, command, now) {
                Ok(applied) => {
                    publish(state, room, &applied, now);
                    CommandAck::ok(action_id.clone(), applied.data)
                }
                Err(rejection) => {
                    debug!(
                        command = name,
                        code = rejection.code(),
                        reason = %rejection,
                        "command rejected"
                    );
                    let data = rejection_data(&rejection);
                    CommandAck::rejected(action_id.clone(), rejection.code(), data)
                }
            }
        })
        .await;

    if ack.ok && ack.duplicate.is_none() {
        state.schedule_persist();
    }
    ack
}

fn apply(
    room: &mut GameRoom,
    actor: &Actor,
    command: ClientCommand,
    now: u64,
) -> Result<Applied, Rejection> {
    match command {
        ClientCommand::Join { name, avatar_ref } => {
            let team_id = acting_team(actor)?;
            let (team, created) = room.join_team(team_id, &name, avatar_ref, now);
            Ok(Applied::with_data(json!({
                "teamId": team.id,
                "created": created,
                "team": TeamSummary::from(&team),
            }))
            .teams_changed())
        }
        ClientCommand::SetStake { amount, use_joker } => {
            let team_id = acting_team(actor)?;
            let requested = exact_integer(&amount).unwrap_or_else(|| {
                debug!(team_id, raw = %amount, "non-integer stake treated as 0");
                0
            });
            let stake = room.set_stake(team_id, requested, use_joker)?;
            Ok(Applied::with_data(stake))
        }
        ClientCommand::Submit { category, payload } => {
            let team_id = acting_team(actor)?;
            let category = parse_category(&category)?;
            let submission = room.submit(team_id, category, &payload, now)?;
            Ok(Applied::with_data(submission))
        }
        ClientCommand::Buzz => {
            let team_id = acting_team(actor)?;
            let entry = room.buzz(team_id, now)?;
            Ok(Applied::with_data(entry))
        }
        ClientCommand::StartCategory { category_id } => {
            let category = parse_category(&category_id)?;
            room.start_category(category)?;
            Ok(Applied::with_data(json!({ "categoryId": category })))
        }
        ClientCommand::LockStakes => {
            let pot = room.lock_stakes()?;
            Ok(Applied::with_data(json!({ "categoryPot": pot })).teams_changed())
        }
        ClientCommand::ResolveRound { winner_ids } => {
            let record = room.resolve_round(&winner_ids, now)?;
            Ok(Applied::with_data(record).teams_changed())
        }
        ClientCommand::AnnounceResult => {
            let announcement = room.announce_result()?;
            Ok(Applied {
                data: serde_json::to_value(&announcement.result).ok(),
                announcement: Some(announcement),
                ..Applied::default()
            })
        }
        ClientCommand::UndoRound { snapshot } => {
            room.undo_round(&snapshot)?;
            Ok(Applied::default().teams_changed())
        }
        ClientCommand::NextRound => {
            let round_index = room.next_round()?;
            Ok(Applied::with_data(json!({ "roundIndex": round_index })))
        }
        ClientCommand::PrevRound => {
            let round_index = room.prev_round()?;
            Ok(Applied::with_data(json!({ "roundIndex": round_index })))
        }
        ClientCommand::FinishCategory => {
            let summary = room.finish_category()?;
            Ok(Applied {
                data: serde_json::to_value(&summary).ok(),
                summary: Some(summary),
                ..Applied::default()
            })
        }
        ClientCommand::GotoLobby => {
            room.goto_lobby();
            Ok(Applied {
                reset: Some(ResetKind::Lobby),
                ..Applied::default()
            })
        }
        ClientCommand::FullReset => {
            room.full_reset();
            Ok(Applied {
                reset: Some(ResetKind::Full),
                teams_changed: true,
                ..Applied::default()
            })
        }
        ClientCommand::TimerStart { seconds } => {
            let seconds = timer_seconds(&seconds);
            let ends_at = room.start_timer(seconds, now);
            Ok(Applied::with_data(json!({ "endsAt": ends_at, "durationSec": seconds })))
        }
        ClientCommand::TimerStop => {
            let stopped = room.stop_timer(now);
            Ok(Applied::with_data(json!({ "stopped": stopped })))
        }
        ClientCommand::TimerResume => {
            let ends_at = room.resume_timer(now)?;
            Ok(Applied::with_data(json!({ "endsAt": ends_at })))
        }
        ClientCommand::TimerReset => {
            room.reset_timer();
            Ok(Applied::default())
        }
        ClientCommand::BuzzerDraw => {
            let data = match room.draw_label()? {
                DrawOutcome::Drawn(label) => json!({ "label": label, "exhausted": false }),
                DrawOutcome::Exhausted => json!({ "label": null, "exhausted": true }),
            };
            Ok(Applied::with_data(data))
        }
        ClientCommand::BuzzerConfirm { team_id } => {
            let record = room.confirm_buzz(team_id.as_deref(), now)?;
            Ok(Applied::with_data(record).teams_changed())
        }
        ClientCommand::BuzzerClear => {
            let label = room.clear_buzz()?;
            Ok(Applied::with_data(json!({ "label": label })))
        }
        ClientCommand::BuzzerUnlock => {
            room.unlock_buzzer()?;
            Ok(Applied::default())
        }
        ClientCommand::BuzzerSetLock { locked } => {
            room.set_buzzer_lock(locked)?;
            Ok(Applied::with_data(json!({ "locked": locked })))
        }
        ClientCommand::TeamUpdate { team_id, patch } => {
            let team = room.update_team(&team_id, patch.into())?;
            Ok(Applied::with_data(TeamSummary::from(&team)).teams_changed())
        }
        ClientCommand::TeamKick { team_id } => {
            let team = room.kick_team(&team_id)?;
            info!(team_id = %team.id, "team removed by admin");
            Ok(Applied::default().teams_changed())
        }
    }
}

fn publish(state: &AppState, room: &GameRoom, applied: &Applied, now: u64) {
    if let Some(summary) = &applied.summary {
        sse_events::broadcast_category_summary(state, summary);
    }
    if let Some(kind) = applied.reset {
        sse_events::broadcast_reset(state, kind);
    }
    if let Some(announcement) = &applied.announcement {
        sse_events::broadcast_result(state, announcement);
    }
    sse_events::broadcast_state(state, room, now);
    if applied.teams_changed {
        sse_events::broadcast_teams(state, room);
    }
}

fn acting_team(actor: &Actor) -> Result<&str, Rejection> {
    actor
        .team_id
        .as_deref()
        .ok_or_else(|| Rejection::unknown_team(""))
}

fn parse_category(raw: &str) -> Result<CategoryId, Rejection> {
    CategoryId::parse(raw)
        .ok_or_else(|| Rejection::invalid_payload(format!("unknown category `{raw}`")))
}

/// Extra context a rejected caller needs, e.g. who holds the buzzer.
fn rejection_data(rejection: &Rejection) -> Option<Value> {
    match rejection {
        Rejection::BuzzerLocked {
            first,
            answer_window_ends_at,
        } => Some(json!({ "first": first, "answerWindowEndsAt": answer_window_ends_at })),
        Rejection::InvalidPayload { reason } => Some(json!({ "reason": reason })),
        _ => None,
    }
}

/// Read an integer from a number or numeric string; fractions are truncated.
pub fn coerce_integer(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|value| value.is_finite())
                .map(|value| value.trunc() as i64)
        }),
        Value::String(text) => {
            let text = text.trim().replace(',', ".");
            text.parse::<i64>().ok().or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .filter(|value| value.is_finite())
                    .map(|value| value.trunc() as i64)
            })
        }
        _ => None,
    }
}

/// Read a whole number from a number or numeric string.
///
/// `6.0` and `"6,0"` are accepted; any fractional part yields `None`.
pub fn exact_integer(raw: &Value) -> Option<i64> {
    let whole = |value: f64| value.is_finite() && value.fract() == 0.0;
    match raw {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|value| whole(*value)).map(|value| value as i64)),
        Value::String(text) => {
            let text = text.trim().replace(',', ".");
            text.parse::<i64>().ok().or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .filter(|value| whole(*value))
                    .map(|value| value as i64)
            })
        }
        _ => None,
    }
}

fn timer_seconds(raw: &Value) -> u32 {
    match coerce_integer(raw) {
        Some(seconds) => {
            seconds.clamp(i64::from(MIN_TIMER_SECS), i64::from(MAX_TIMER_SECS)) as u32
        }
        None => {
            debug!(raw = %raw, "timer duration missing, using default");
            DEFAULT_TIMER_SECS
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::snapshot_store::memory::MemorySnapshotStore,
        dto::sse::ServerEvent,
        services::sse_events::{EVENT_STATE_UPDATE, EVENT_TEAMS_UPDATE},
        state::{AppState, clock::ManualClock, state_machine::Phase},
    };

    pub(crate) fn test_state() -> (SharedState, Arc<ManualClock>, MemorySnapshotStore) {
        let config = AppConfig::default();
        let room = GameRoom::new(config.room_config());
        let clock = Arc::new(ManualClock::new(1_000));
        let store = MemorySnapshotStore::default();
        let state = AppState::new(config, room, Arc::new(store.clone()), clock.clone());
        (state, clock, store)
    }

    pub(crate) fn command(raw: Value) -> CommandEnvelope {
        CommandEnvelope::from_value(raw).unwrap()
    }

    async fn join(state: &SharedState, team_id: &str) {
        let ack = execute(
            state,
            &Actor::team(team_id),
            command(json!({ "type": "team.join", "name": team_id })),
        )
        .await;
        assert!(ack.ok, "{ack:?}");
    }

    async fn admin(state: &SharedState, raw: Value) -> CommandAck {
        execute(state, &Actor::admin(), command(raw)).await
    }

    fn drain(receiver: &mut tokio::sync::broadcast::Receiver<ServerEvent>) -> Vec<String> {
        let mut names = Vec::new();
        loop {
            match receiver.try_recv() {
                Ok(event) => names.push(event.event.unwrap_or_default()),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => return names,
            }
        }
    }

    #[tokio::test]
    async fn duplicate_stake_action_is_applied_once() {
        let (state, _clock, _store) = test_state();
        join(&state, "a").await;
        join(&state, "b").await;
        let start = json!({ "type": "admin.startCategory", "categoryId": "quiz" });
        assert!(admin(&state, start).await.ok);

        let stake = json!({ "type": "team.setStake", "amount": 6, "actionId": "s-1" });
        let first = execute(&state, &Actor::team("a"), command(stake.clone())).await;
        assert!(first.ok);
        assert_eq!(first.duplicate, None);
        assert_eq!(first.data, Some(json!({ "amount": 6, "jokerApplied": false })));

        // A different stake under the same action id is still a retry.
        let retry = json!({ "type": "team.setStake", "amount": 3, "actionId": "s-1" });
        let second = execute(&state, &Actor::team("a"), command(retry)).await;
        assert!(second.ok);
        assert_eq!(second.duplicate, Some(true));
        assert_eq!(
            state.with_room(|room| room.state().stakes["a"].amount).await,
            6
        );

        // Another team may reuse the same id.
        let other = execute(&state, &Actor::team("b"), command(stake)).await;
        assert_eq!(other.duplicate, None);
    }

    #[tokio::test]
    async fn team_cannot_send_admin_commands() {
        let (state, _clock, _store) = test_state();
        join(&state, "a").await;

        let ack = execute(
            &state,
            &Actor::team("a"),
            command(json!({ "type": "admin.startCategory", "categoryId": "quiz" })),
        )
        .await;
        assert_eq!(ack.error.as_deref(), Some("unauthorized"));
        assert_eq!(state.with_room(|room| room.phase()).await, Phase::Lobby);

        let ack = execute(&state, &Actor::admin(), command(json!({ "type": "team.buzz" }))).await;
        assert_eq!(ack.error.as_deref(), Some("unauthorized"));
    }

    #[tokio::test]
    async fn out_of_order_command_is_a_quiet_rejection() {
        let (state, _clock, _store) = test_state();
        let mut events = state.public_sse().subscribe();

        let ack = admin(&state, json!({ "type": "admin.lockStakes", "actionId": "l-1" })).await;
        assert!(!ack.ok);
        assert_eq!(ack.error.as_deref(), Some("invalid_transition"));
        assert_eq!(ack.action_id.as_deref(), Some("l-1"));
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn mutations_broadcast_state_then_teams() {
        let (state, _clock, _store) = test_state();
        let mut events = state.public_sse().subscribe();

        join(&state, "a").await;
        assert_eq!(drain(&mut events), vec![EVENT_STATE_UPDATE, EVENT_TEAMS_UPDATE]);

        let start = json!({ "type": "admin.startCategory", "categoryId": "Schätzung" });
        assert!(admin(&state, start).await.ok);
        assert_eq!(drain(&mut events), vec![EVENT_STATE_UPDATE]);
        assert_eq!(
            state.with_room(|room| room.state().current_category).await,
            Some(CategoryId::Estimation)
        );
    }

    #[tokio::test]
    async fn locked_buzz_tells_the_late_team_who_answers() {
        let (state, clock, _store) = test_state();
        join(&state, "a").await;
        join(&state, "b").await;
        for raw in [
            json!({ "type": "admin.startCategory", "categoryId": "buzzer_race" }),
            json!({ "type": "admin.lockStakes" }),
            json!({ "type": "admin.buzzer.draw" }),
        ] {
            assert!(admin(&state, raw).await.ok);
        }

        let buzz = json!({ "type": "team.buzz" });
        let first = execute(&state, &Actor::team("a"), command(buzz.clone())).await;
        assert!(first.ok);

        clock.advance(120);
        let late = execute(&state, &Actor::team("b"), command(buzz)).await;
        assert_eq!(late.error.as_deref(), Some("buzzer_locked"));
        let data = late.data.unwrap();
        assert_eq!(data["first"]["teamId"], "a");
        assert_eq!(data["first"]["ts"], 1_000);
        assert_eq!(data["answerWindowEndsAt"], 46_000);
    }

    #[tokio::test]
    async fn successful_commands_request_persistence() {
        let (state, _clock, _store) = test_state();
        join(&state, "a").await;
        // The permit left by schedule_persist resolves immediately.
        tokio::time::timeout(
            std::time::Duration::from_millis(50),
            state.persist_signal().notified(),
        )
        .await
        .unwrap();
    }

    #[test]
    fn numeric_inputs_are_coerced() {
        assert_eq!(coerce_integer(&json!(6)), Some(6));
        assert_eq!(coerce_integer(&json!(6.9)), Some(6));
        assert_eq!(coerce_integer(&json!(" 9 ")), Some(9));
        assert_eq!(coerce_integer(&json!("3,0")), Some(3));
        assert_eq!(coerce_integer(&json!("six")), None);
        assert_eq!(coerce_integer(&Value::Null), None);

        assert_eq!(exact_integer(&json!(6)), Some(6));
        assert_eq!(exact_integer(&json!(6.0)), Some(6));
        assert_eq!(exact_integer(&json!("3,0")), Some(3));
        assert_eq!(exact_integer(&json!(6.9)), None);
        assert_eq!(exact_integer(&json!("3.5")), None);
        assert_eq!(exact_integer(&json!("6,7")), None);

        assert_eq!(timer_seconds(&json!(5_000)), MAX_TIMER_SECS);
        assert_eq!(timer_seconds(&json!(0)), MIN_TIMER_SECS);
        assert_eq!(timer_seconds(&json!("45")), 45);
        assert_eq!(timer_seconds(&Value::Null), DEFAULT_TIMER_SECS);
    }

    #[tokio::test]
    async fn fractional_stakes_are_stored_as_zero() {
        let (state, _clock, _store) = test_state();
        join(&state, "a").await;
        let start = json!({ "type": "admin.startCategory", "categoryId": "quiz" });
        assert!(admin(&state, start).await.ok);

        for amount in [json!(6.9), json!("3.5"), json!("6,7")] {
            let stake = json!({ "type": "team.setStake", "amount": amount });
            let ack = execute(&state, &Actor::team("a"), command(stake)).await;
            assert!(ack.ok, "{ack:?}");
            assert_eq!(
                state.with_room(|room| room.state().stakes["a"].amount).await,
                0,
                "stake {amount}"
            );
        }

        let stake = json!({ "type": "team.setStake", "amount": "6,0" });
        assert!(execute(&state, &Actor::team("a"), command(stake)).await.ok);
        assert_eq!(
            state.with_room(|room| room.state().stakes["a"].amount).await,
            6
        );
    }

    #[tokio::test]
    async fn team_named_admin_does_not_share_the_admin_scope() {
        let (state, _clock, _store) = test_state();
        let start = json!({ "type": "admin.startCategory", "categoryId": "quiz", "actionId": "x-1" });
        assert!(admin(&state, start).await.ok);

        let frame = json!({ "type": "team.join", "name": "Sneaky", "actionId": "x-1" });
        let ack = execute(&state, &Actor::team("admin"), command(frame)).await;
        assert!(ack.ok, "{ack:?}");
        assert_eq!(ack.duplicate, None);
        assert_eq!(state.with_room(|room| room.teams().len()).await, 1);
    }
}
