//! Potluck Back binary entrypoint wiring REST, WebSocket, SSE and snapshot persistence.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use potluck_back::{
    config::AppConfig,
    dao::snapshot_store::{
        SnapshotStore, file::FileSnapshotStore, memory::MemorySnapshotStore,
    },
    routes,
    services::{snapshotter, ticker},
    state::{AppState, SharedState, clock::SystemClock},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    install_panic_hook();

    let config = AppConfig::load();
    let (store, store_ready): (Arc<dyn SnapshotStore>, bool) =
        match FileSnapshotStore::open(&config.data_dir).await {
            Ok(store) => {
                info!(dir = %store.dir().display(), "snapshot directory ready");
                (Arc::new(store), true)
            }
            Err(err) => {
                warn!(error = %err, "cannot open data directory; running without persistence");
                (Arc::new(MemorySnapshotStore::default()), false)
            }
        };

    let room = snapshotter::restore(store.as_ref(), config.room_config()).await;
    let app_state = AppState::new(config, room, store, Arc::new(SystemClock));
    if !store_ready {
        app_state.set_degraded(true);
    }

    tokio::spawn(snapshotter::run(app_state.clone()));
    tokio::spawn(ticker::run(app_state.clone()));

    let app = build_router(app_state.clone());

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    let shutdown_state = app_state.clone();
    axum::serve(listener, service)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            snapshotter::shutdown(&shutdown_state).await;
        })
        .await
        .context("serving axum")?;

    // Commands accepted while connections drained.
    if let Err(err) = snapshotter::flush(&app_state).await {
        error!(error = %err, "snapshot after drain could not be written");
    }
    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Route panics through tracing; the runtime keeps serving other tasks.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic| {
        let location = panic
            .location()
            .map(|location| format!("{}:{}", location.file(), location.line()))
            .unwrap_or_default();
        error!(%location, "task panicked: {panic}");
    }));
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}
