//! Countdown Timers - independent countdown timers served over HTTP
//!
//! This is the main entry point for the countdown-timers application.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use countdown_timers::{
    api::create_router,
    config::Config,
    state::AppState,
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("countdown_timers={},tower_http=info", config.log_level()))
        .init();

    config.validate()?;

    info!("Starting countdown-timers server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: host={}, port={}, tick={}ms, start threshold={}ms",
          config.host, config.port, config.tick_ms, config.start_threshold_ms);

    // Create application state
    let state = Arc::new(AppState::new(
        config.port,
        config.host.clone(),
        config.engine_settings(),
    ));

    // Create HTTP router with all endpoints
    let app = create_router(state);

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  POST   /timers            - Create a timer (period_ms or period_minutes)");
    info!("  GET    /timers            - List timers");
    info!("  GET    /timers/:id        - Show a timer");
    info!("  POST   /timers/:id/start  - Start a timer");
    info!("  POST   /timers/:id/stop   - Pause a timer");
    info!("  POST   /timers/:id/reset  - Reset a timer");
    info!("  DELETE /timers/:id        - Delete a timer");
    info!("  POST   /suspend           - Hand timekeeping to the wall clock");
    info!("  POST   /resume            - Reconcile and resume ticking");
    info!("  GET    /events            - Tick and finish event stream");
    info!("  GET    /status            - Service status");
    info!("  GET    /health            - Health check");

    // Setup graceful shutdown
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
