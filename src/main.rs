//! Snowfight Server - authoritative team capture-the-flag server
//!
//! This is the main entry point for the game server. It handles:
//! - WebSocket connections carrying the binary game protocol
//! - Matchmaking waiting players into games with robot teammates
//! - Validating every move, throw and flag grab against dead reckoning

mod app;
mod config;
mod game;
mod http;
mod matchmaking;
mod scheduler;
mod util;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::{AppState, GameServer};
use crate::config::Config;
use crate::game::{GameRules, MapInfo, StandardGameFactory};
use crate::http::build_router;
use crate::matchmaking::Matchmaker;
use crate::scheduler::Scheduler;
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    init_tracing(&config.log_level);
    init_server_time();

    info!("Starting Snowfight Server");
    info!("Server address: {}", config.server_addr);

    let (scheduler, fired) = Scheduler::new(Handle::current());
    let tasks = Arc::new(scheduler);

    let map = Arc::new(MapInfo::default());
    info!(map = %map.name, "Loaded arena");

    let factory = StandardGameFactory {
        map: map.clone(),
        trimmer: map,
        tasks: tasks.clone(),
        rules: GameRules {
            respawn_delay: config.respawn_delay,
        },
        robots_per_game: config.robots_per_game,
        robot_move_delay: config.robot_move_delay,
    };
    let matchmaker = Matchmaker::new(config.players_per_game, config.matchmaker_poll);

    let server = Arc::new(GameServer::new(Arc::new(factory), tasks, matchmaker));
    tokio::spawn(server.clone().run_tasks(fired));
    server.start();

    let state = AppState::new(config.clone(), server);
    let router = build_router(state);

    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws?name=<player>", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
