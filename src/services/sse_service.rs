use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc, watch,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::{
    dto::{
        common::{AdminStateSnapshot, PublicStateSnapshot},
        sse::{Handshake, ServerEvent},
    },
    services::sse_events::{EVENT_HANDSHAKE, EVENT_STATE_UPDATE},
    state::SharedState,
};

/// Identifies the target SSE stream.
#[derive(Clone, Copy, Debug)]
pub enum StreamKind {
    /// Everyone's view.
    Public,
    /// Operator view.
    Admin,
}

impl StreamKind {
    fn name(self) -> &'static str {
        match self {
            StreamKind::Public => "public",
            StreamKind::Admin => "admin",
        }
    }
}

/// Subscribe to a stream and queue the events a new client needs first.
///
/// The handshake and the current state are sent before anything broadcast
/// after the subscription, so a client never starts from an empty screen.
pub async fn subscribe(
    state: &SharedState,
    kind: StreamKind,
) -> (Vec<ServerEvent>, broadcast::Receiver<ServerEvent>) {
    let now = state.now_ms();
    let (receiver, snapshot) = state
        .with_room(|room| {
            let receiver = match kind {
                StreamKind::Public => state.public_sse().subscribe(),
                StreamKind::Admin => state.admin_sse().subscribe(),
            };
            let snapshot = match kind {
                StreamKind::Public => ServerEvent::json(
                    EVENT_STATE_UPDATE.to_string(),
                    &PublicStateSnapshot::capture(room, now),
                ),
                StreamKind::Admin => ServerEvent::json(
                    EVENT_STATE_UPDATE.to_string(),
                    &AdminStateSnapshot::capture(room, now),
                ),
            };
            (receiver, snapshot)
        })
        .await;

    let handshake = ServerEvent::json(
        EVENT_HANDSHAKE.to_string(),
        &Handshake {
            stream: kind.name().into(),
            message: format!("{} stream connected", kind.name()),
            degraded: state.is_degraded(),
        },
    );
    let initial = [handshake, snapshot].into_iter().flatten().collect();
    (initial, receiver)
}

/// Convert a broadcast receiver into an SSE response, forwarding events and
/// cleaning up once the client disconnects or the server shuts down.
pub fn to_sse_stream(
    initial: Vec<ServerEvent>,
    receiver: broadcast::Receiver<ServerEvent>,
    kind: StreamKind,
    shutdown: watch::Receiver<bool>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = forward_events(initial, receiver, kind, shutdown);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Spawn the forwarder task and return the stream it feeds.
///
/// The stream ends when the client goes away or shutdown begins, so graceful
/// shutdown never waits on an idle subscriber.
pub fn forward_events(
    initial: Vec<ServerEvent>,
    mut receiver: broadcast::Receiver<ServerEvent>,
    kind: StreamKind,
    mut shutdown: watch::Receiver<bool>,
) -> ReceiverStream<Result<Event, Infallible>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: reads from broadcast and pushes into mpsc
    tokio::spawn(async move {
        for payload in initial {
            if tx.send(Ok(to_event(payload))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                _ = async { let _ = shutdown.wait_for(|stopping| *stopping).await; } => {
                    debug!(stream = kind.name(), "closing SSE stream for shutdown");
                    break;
                }
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            // The next state.update carries the full state again.
                            debug!(stream = kind.name(), skipped, "SSE subscriber lagged");
                            continue;
                        }
                    }
                }
            }
        }

        info!(stream = kind.name(), "SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    ReceiverStream::new(rx)
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}
