//! RoboRush Server - authoritative game server for turn-based robot racing
//!
//! This is the main entry point for the game server. It handles:
//! - The game loop driving the rounds
//! - HTTP endpoints for registration, actions and game queries
//! - WebSocket push of game events
//! - Supabase integration for maps, robots, settings and results

mod app;
mod config;
mod game;
mod http;
mod settings;
mod store;
mod util;
mod ws;

#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::game::{DummyBots, GameLoop};
use crate::http::build_router;
use crate::util::time::init_server_time;

/// How often idle rate limiter entries are dropped
const LIMITER_SHRINK_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting RoboRush Server");
    info!("Server address: {}", config.server_addr);
    info!(tile_scan_cost = config.tile_scan_cost, "Game configuration loaded");

    // Create application state
    let state = AppState::new(config.clone());

    // Spawn the game loop, it runs for the lifetime of the process
    GameLoop::new(state.game.clone()).spawn();

    if !config.dummy_bot_robot_ids.is_empty() {
        info!(robots = ?config.dummy_bot_robot_ids, "Dummy bots enabled");
        DummyBots::new(state.game.clone(), &config.dummy_bot_robot_ids).spawn();
    }

    let limiter = state.action_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LIMITER_SHRINK_INTERVAL);
        loop {
            interval.tick().await;
            limiter.shrink();
        }
    });

    // Build router
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

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
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install signal handler");
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
