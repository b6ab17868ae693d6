//! Scoreboard - live match clock, score and overlay event server
//!
//! This is the main entry point for the scoreboard application.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use scoreboard::{
    api::create_router,
    config::Config,
    services::{load_snapshot, save_snapshot},
    state::AppState,
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("scoreboard={},tower_http=info", config.log_level()))
        .init();

    info!("Starting scoreboard server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: host={}, port={}, state_file={:?}",
          config.host, config.port, config.state_file);

    let state = Arc::new(AppState::new(config.port, config.host.clone(), config.channel_capacity));

    if let Some(path) = &config.state_file {
        match load_snapshot(path).await {
            Ok(Some(snapshot)) => {
                if let Err(e) = state.restore_snapshot(snapshot) {
                    warn!("Failed to restore snapshot: {}", e);
                }
            }
            Ok(None) => info!("No saved state at {}, starting fresh", path.display()),
            Err(e) => warn!("Ignoring saved state: {:#}", e),
        }
    }

    let app = create_router(Arc::clone(&state));

    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  GET  /timer          - Timer snapshot with server time");
    info!("  GET  /game_state     - Current score");
    info!("  POST /events/:name   - Control command (start-timer, set-timer, trigger-goal, ...)");
    info!("  GET  /events/stream  - Overlay event stream (SSE)");
    info!("  GET  /status         - Server status");
    info!("  GET  /health         - Health check");

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    if let Some(path) = &config.state_file {
        match state.export_snapshot() {
            Ok(snapshot) => {
                if let Err(e) = save_snapshot(path, &snapshot).await {
                    error!("Failed to save state: {:#}", e);
                }
            }
            Err(e) => error!("Failed to capture state: {}", e),
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
