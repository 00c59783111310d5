//! Dashboard Session API server
//!
//! Loads the configuration, connects to the analysis backend, discovers the
//! data columns and serves the Session API.
//!
//! # Usage
//!
//! ```bash
//! # Against the statistical backend on localhost:5001 (default)
//! cargo run --bin dashboard-server
//!
//! # Offline, with the in-memory backend
//! DASHBOARD_BACKEND=local cargo run --bin dashboard-server
//! ```
//!
//! # Environment Variables
//!
//! - `DASHBOARD_CONFIG`: path to a TOML config file (default: searched)
//! - `DASHBOARD_BACKEND`: `http` or `local`
//! - `BACKEND_URL`: statistical backend base URL
//! - `HOST`, `PORT`: bind address (default: 0.0.0.0:8080)
//! - `DASHBOARD_SETTLE_MS`: map-only debounce period
//! - `RUST_LOG`: log level (default: info)

use std::env;
use std::net::SocketAddr;

use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use choropleth_dashboard::config::DashboardConfig;
use choropleth_dashboard::gateway::create_backend;
use choropleth_dashboard::http::{create_router, AppState};
use choropleth_dashboard::state::PatternStateMachine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting dashboard server");

    let mut config = match env::var("DASHBOARD_CONFIG") {
        Ok(path) => DashboardConfig::from_file(&path)?,
        Err(_) => DashboardConfig::load_or_default()?,
    };
    config.apply_env()?;

    let backend = create_backend(&config.backend)?;
    info!(kind = %config.backend.kind, url = %config.backend.url, "backend initialized");

    let machine = PatternStateMachine::with_config(backend, &config);
    if !machine.health_check().await {
        warn!("analysis backend is not healthy yet");
    }
    if let Err(err) = machine.discover_columns().await {
        // The front end can retry through POST /v1/session/discover.
        warn!(error = %err, "initial column discovery failed");
    }

    let addr: SocketAddr = config.server.bind_address().parse()?;
    let app = create_router(AppState::new(machine, config));

    info!("Server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
