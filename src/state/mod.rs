pub mod buzzer;
pub mod category;
pub mod clock;
pub mod game;
pub mod idempotency;
pub mod ledger;
pub mod rejection;
pub mod room;
pub mod scheduler;
mod sse;
pub mod state_machine;
pub mod teams;
pub mod timer;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, Notify, watch};

use crate::{config::AppConfig, dao::snapshot_store::SnapshotStore, dto::ws::ClientRole};

pub use self::rejection::Rejection;
pub use self::room::{GameRoom, RoomConfig, TickEffect};
pub use self::sse::SseHub;
use self::{clock::Clock, game::TeamId, sse::SseState};

/// Handle shared by every handler and background task.
pub type SharedState = Arc<AppState>;

#[derive(Debug, Clone)]
/// Registry entry of a connected WebSocket client.
pub struct ClientConnection {
    /// Per-connection UUID.
    pub id: String,
    /// Role given at identification.
    pub role: ClientRole,
    /// Identity team commands act on; `None` for admins.
    pub team_id: Option<TeamId>,
}

/// Central application state: the room, its broadcast hubs and persistence handles.
///
/// The room sits behind a single async mutex. Tokio's mutex is fair, so
/// commands are applied one at a time in arrival order.
pub struct AppState {
    config: AppConfig,
    clock: Arc<dyn Clock>,
    room: Mutex<GameRoom>,
    sse: SseState,
    clients: DashMap<String, ClientConnection>,
    snapshot_store: Arc<dyn SnapshotStore>,
    persist_signal: Notify,
    degraded: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(
        config: AppConfig,
        room: GameRoom,
        snapshot_store: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(false);
        let (shutdown_tx, _rx) = watch::channel(false);
        Arc::new(Self {
            config,
            clock,
            room: Mutex::new(room),
            sse: SseState::new(64, 64),
            clients: DashMap::new(),
            snapshot_store,
            persist_signal: Notify::new(),
            degraded: degraded_tx,
            shutdown: shutdown_tx,
        })
    }

    /// Loaded application configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Current instant in epoch milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Run `f` with shared access to the room.
    pub async fn with_room<R>(&self, f: impl FnOnce(&GameRoom) -> R) -> R {
        let room = self.room.lock().await;
        f(&room)
    }

    /// Run `f` with exclusive access to the room.
    ///
    /// Keep `f` synchronous: nothing else can touch the room while it runs.
    pub async fn with_room_mut<R>(&self, f: impl FnOnce(&mut GameRoom) -> R) -> R {
        let mut room = self.room.lock().await;
        f(&mut room)
    }

    /// Backend the snapshotter writes to.
    pub fn snapshot_store(&self) -> Arc<dyn SnapshotStore> {
        self.snapshot_store.clone()
    }

    /// Ask the snapshotter for a debounced write.
    pub fn schedule_persist(&self) {
        self.persist_signal.notify_one();
    }

    /// Signal the snapshotter waits on.
    pub fn persist_signal(&self) -> &Notify {
        &self.persist_signal
    }

    /// Whether the last snapshot write failed.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag, returning whether it changed.
    pub fn set_degraded(&self, value: bool) -> bool {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        })
    }

    /// Tell every open stream and socket to close.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Receiver that turns `true` once shutdown began.
    pub fn shutdown_watcher(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        self.sse.public()
    }

    /// Broadcast hub used for the admin SSE stream.
    pub fn admin_sse(&self) -> &SseHub {
        self.sse.admin()
    }

    /// Registry of active WebSocket clients keyed by connection id.
    pub fn clients(&self) -> &DashMap<String, ClientConnection> {
        &self.clients
    }
}
