//! Axum Handlers for the HTTP surface
//!
//! The welcome page and the health checks. Handlers carry `utoipa` doc
//! comments for the generated OpenAPI document.

use crate::{
    config::ServerEnv,
    models::{HealthResponse, WsHealthResponse},
    state::AppState,
};
use axum::{
    extract::State,
    response::{Html, Json},
};
use std::sync::Arc;

const SERVICE_NAME: &str = "deescalation-coach";

/// Welcome page advertising the speech WebSocket endpoint.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "HTML welcome page", body = String, content_type = "text/html")
    )
)]
pub async fn root(State(state): State<Arc<AppState>>) -> Html<String> {
    let config = &state.config;
    let (badge, color) = match config.server_env {
        ServerEnv::Prod => ("PRODUCTION", "#28a745"),
        ServerEnv::Dev => ("DEVELOPMENT", "#ffc107"),
    };
    let ws_url = config.advertised_ws_url();

    Html(format!(
        r#"<html>
    <head>
        <title>Realtime De-escalation Coach</title>
        <style>
            body {{ font-family: Arial, sans-serif; margin: 40px; text-align: center; }}
            h1 {{ color: #333; }}
            p {{ color: #666; }}
            .endpoint {{ background: #f5f5f5; padding: 10px; margin: 10px 0; border-radius: 5px; }}
            .env-badge {{ background: {color}; color: white; padding: 5px 10px; border-radius: 15px; font-size: 0.8em; }}
        </style>
    </head>
    <body>
        <h1>Realtime De-escalation Coach</h1>
        <p>De-escalation Training System</p>
        <div class="env-badge">{badge}</div>
        <br>
        <div class="endpoint"><strong>WebSocket Endpoint:</strong> {ws_url}</div>
        <div class="endpoint"><strong>Health Check:</strong> <a href="/health">/health</a></div>
        <div class="endpoint"><strong>API Docs:</strong> <a href="/swagger-ui">/swagger-ui</a></div>
    </body>
</html>"#
    ))
}

/// Service health, including whether an upstream key is configured.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let config = &state.config;
    let websocket_protocol = if config.uses_secure_websocket() {
        "wss"
    } else {
        "ws"
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        environment: config.server_env.as_str().to_string(),
        host: config.public_host.clone(),
        port: config.bind_address.port(),
        websocket_protocol: websocket_protocol.to_string(),
        openai_key_configured: config.openai_api_key.is_some(),
        active_connections: state.registry.len().await,
    })
}

/// Health of the WebSocket bridge.
#[utoipa::path(
    get,
    path = "/api/ws/health",
    responses((status = 200, description = "WebSocket handler is up", body = WsHealthResponse))
)]
pub async fn ws_health(State(state): State<Arc<AppState>>) -> Json<WsHealthResponse> {
    Json(WsHealthResponse {
        status: "healthy".to_string(),
        active_connections: state.registry.len().await,
        service: "websocket-handler".to_string(),
    })
}
