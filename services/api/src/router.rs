//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the health endpoints, the WebSocket endpoints, token minting and
//! the OpenAPI documentation.

use crate::{
    handlers,
    models::{
        CustomConfiguration, HealthResponse, PreflightResponse, TokenErrorBody, TokenRequest,
        TokenResponse, WsHealthResponse,
    },
    state::AppState,
    token,
    ws::{echo_handler, ws_handler},
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::root,
        handlers::health,
        handlers::ws_health,
        token::mint_token,
        token::token_preflight,
    ),
    components(
        schemas(
            HealthResponse,
            WsHealthResponse,
            TokenRequest,
            TokenResponse,
            CustomConfiguration,
            TokenErrorBody,
            PreflightResponse
        )
    ),
    tags(
        (
            name = "De-escalation Coach API",
            description = "Realtime audio relay for de-escalation training feedback"
        )
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/api/ws/health", get(handlers::ws_health))
        .route("/api/ws/speech", get(ws_handler))
        .route("/api/ws/test", get(echo_handler))
        .with_state(app_state.clone());

    // The token route sets its own fixed CORS headers, so it is merged after
    // the permissive layer has been applied.
    let token_router = Router::new()
        .route(
            "/api/token",
            post(token::mint_token).options(token::token_preflight),
        )
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
        .layer(cors)
        .merge(token_router)
}
