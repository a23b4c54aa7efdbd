use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        mpsc, watch,
    },
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        sse::ServerEvent,
        ws::{ClientRole, CommandAck, CommandEnvelope, IdentificationMessage, OutboundMessage},
    },
    services::command_service::{self, Actor},
    state::{ClientConnection, SharedState},
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);
const MALFORMED_CODE: &str = "invalid_payload";

/// The writer task is gone; the connection must be torn down.
#[derive(Debug, Error)]
#[error("connection closed")]
struct ConnectionClosed;

/// Handle the full lifecycle of a team or admin WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let identification = match IdentificationMessage::from_json_str(&initial_message) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, "first message was not a valid identification");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let connection_id = Uuid::new_v4().to_string();
    let actor = match identification.role {
        ClientRole::Team => Actor::team(
            identification
                .client_token
                .unwrap_or_else(|| connection_id.clone()),
        ),
        ClientRole::Admin => Actor::admin(),
    };

    // Subscribe before the welcome so no event between the two is missed.
    let mut events = match actor.role {
        ClientRole::Team => state.public_sse().subscribe(),
        ClientRole::Admin => state.admin_sse().subscribe(),
    };

    state.clients().insert(
        connection_id.clone(),
        ClientConnection {
            id: connection_id.clone(),
            role: actor.role,
            team_id: actor.team_id.clone(),
        },
    );
    info!(id = %connection_id, role = ?actor.role, team_id = ?actor.team_id, "client connected");

    let welcome = OutboundMessage::Welcome {
        connection_id: connection_id.clone(),
        role: actor.role,
        team_id: actor.team_id.clone(),
        server_now: state.now_ms(),
    };
    if send_message(&outbound_tx, &welcome).is_ok() {
        let session = Session {
            state: &state,
            actor: &actor,
            connection_id: &connection_id,
            outbound_tx: &outbound_tx,
        };
        session
            .run(&mut receiver, &mut events, state.shutdown_watcher())
            .await;
    }

    state.clients().remove(&connection_id);
    info!(id = %connection_id, "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// An identified connection.
struct Session<'a> {
    state: &'a SharedState,
    actor: &'a Actor,
    connection_id: &'a str,
    outbound_tx: &'a mpsc::UnboundedSender<Message>,
}

impl Session<'_> {
    /// Serve commands and forward events until either side closes or the
    /// server shuts down.
    async fn run(
        &self,
        receiver: &mut futures::stream::SplitStream<WebSocket>,
        events: &mut broadcast::Receiver<ServerEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let connection_id = self.connection_id;
        loop {
            tokio::select! {
                _ = async { let _ = shutdown.wait_for(|stopping| *stopping).await; } => {
                    debug!(id = %connection_id, "closing websocket for shutdown");
                    let _ = self.outbound_tx.send(Message::Close(None));
                    break;
                }
                frame = receiver.next() => {
                    let Some(frame) = frame else { break };
                    match frame {
                        Ok(Message::Text(text)) => {
                            debug!(id = %connection_id, payload = %text.as_str(), "received client message");
                            let ack = handle_command(self.state, self.actor, text.as_str()).await;
                            if send_message(self.outbound_tx, &OutboundMessage::Ack(ack)).is_err() {
                                break;
                            }
                        }
                        Ok(Message::Ping(payload)) => {
                            let _ = self.outbound_tx.send(Message::Pong(payload));
                        }
                        Ok(Message::Close(frame)) => {
                            let _ = self.outbound_tx.send(Message::Close(frame));
                            break;
                        }
                        Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
                        Err(err) => {
                            warn!(id = %connection_id, error = %err, "websocket error");
                            break;
                        }
                    }
                }
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if forward_event(self.outbound_tx, event).is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(id = %connection_id, skipped, "websocket client lagged behind events");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }
    }
}

/// Parse one command frame and apply it.
///
/// A frame that cannot be read is answered with `invalid_payload` and has no effect.
async fn handle_command(state: &SharedState, actor: &Actor, text: &str) -> CommandAck {
    match CommandEnvelope::from_json_str(text) {
        Ok(envelope) => command_service::execute(state, actor, envelope).await,
        Err(err) => {
            debug!(error = %err, "malformed command frame");
            CommandAck::rejected(None, MALFORMED_CODE, None)
        }
    }
}

fn forward_event(
    tx: &mpsc::UnboundedSender<Message>,
    event: ServerEvent,
) -> Result<(), ConnectionClosed> {
    let data = serde_json::from_str(&event.data).unwrap_or(Value::String(event.data));
    let message = OutboundMessage::Event {
        event: event.event.unwrap_or_else(|| "message".into()),
        data,
    };
    send_message(tx, &message)
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Returns `Ok(())` if the message was queued or if serialization failed
/// (permanent error, no point retrying). Returns `Err(ConnectionClosed)`
/// when the writer channel is closed.
fn send_message<T>(tx: &mpsc::UnboundedSender<Message>, value: &T) -> Result<(), ConnectionClosed>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}` (permanent error, not retrying)");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
