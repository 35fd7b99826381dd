// Process bootstrap: logging, state wiring, and the websocket server.

use crate::frameworks::config;
use crate::interface_adapters::clients::StatsClient;
use crate::interface_adapters::metrics::Metrics;
use crate::interface_adapters::net::ws_handler;
use crate::interface_adapters::state::AppState;
use crate::use_cases::manager::run_match_lifecycle;
use crate::use_cases::{GameManager, Hub, Matchmaking, TournamentDirector};

use axum::{Router, routing::get};
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// Snapshot emission and the stats sink make hyper/reqwest internals chatty
// at info level, so they default to warn; RUST_LOG overrides everything and
// LOG_FORMAT=json switches to machine-readable lines.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v == "json") {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    // A panicking engine or lifecycle task must leave a trace, with the
    // source location when one is known.
    std::panic::set_hook(Box::new(|panic| match panic.location() {
        Some(location) => error!(%panic, %location, "panic"),
        None => error!(%panic, "panic"),
    }));
}

/// Serve the websocket surface on an already-bound listener.
///
/// Split from [`run_with_config`] so integration tests can bind an
/// ephemeral port and skip the logging setup.
pub async fn run(listener: tokio::net::TcpListener) -> io::Result<()> {
    let state = build_state()?;
    let router = Router::new().route("/ws", get(ws_handler)).with_state(state);

    let address = listener.local_addr()?;
    info!(
        %address,
        tick_ms = config::TICK_INTERVAL.as_millis() as u64,
        "pong server listening"
    );

    if let Err(e) = axum::serve(listener, router).await {
        error!(error = %e, "websocket server exited");
        return Err(e);
    }
    Ok(())
}

/// Full entry point: .env, logging, port bind, then [`run`].
pub async fn run_with_config() -> io::Result<()> {
    let _ = dotenvy::dotenv();
    init_logging();

    let port = config::http_port();
    let listener = match tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(port, error = %e, "could not bind the game port");
            return Err(e);
        }
    };
    run(listener).await
}

fn build_state() -> io::Result<AppState> {
    let stats_base_url = config::stats_service_url();
    let stats = StatsClient::new(stats_base_url.clone(), config::stats_timeout())
        .map_err(|e| io::Error::other(format!("failed to initialize stats client: {e}")))?;
    tracing::debug!(stats_base_url = %stats_base_url, "stats client configured");

    let hub = Arc::new(Hub::new());
    let (end_tx, end_rx) = mpsc::channel(config::MATCH_END_CHANNEL_CAPACITY);

    let state = AppState {
        hub: hub.clone(),
        matchmaking: Arc::new(Matchmaking::new()),
        manager: Arc::new(GameManager::new(hub, end_tx)),
        director: Arc::new(TournamentDirector::new()),
        stats: Arc::new(stats),
        metrics: Arc::new(Metrics::new()),
    };

    // Engine results flow through one lifecycle task: stats, metrics,
    // disposal scheduling, tournament advancement.
    tokio::spawn(run_match_lifecycle(end_rx, state.clone()));

    Ok(state)
}
