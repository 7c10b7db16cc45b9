//! Main Entrypoint for the De-escalation Coach API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing logging.
//! 3. Building the shared application state and router.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use coach_api::{config::Config, router::create_router, state::AppState};
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    if config.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; speech sessions and token minting will fail");
    }

    // --- 3. Create State and Router ---
    let app_state = Arc::new(AppState::new(config.clone()));
    let app = create_router(app_state.clone());

    // --- 4. Start Server ---
    info!(
        environment = config.server_env.as_str(),
        model = %config.realtime_model,
        bind_address = %config.bind_address,
        ws_url = %config.advertised_ws_url(),
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!(
        open_connections = app_state.registry.len().await,
        "Server has shut down."
    );
    Ok(())
}
