//! Ephemeral credential minting.
//!
//! Browsers that talk to the realtime API directly need a short-lived token.
//! This endpoint resolves the caller's optional overrides, asks the upstream
//! REST API for a session and shapes the answer. Every response, errors
//! included, carries the same fixed CORS header set.

use crate::{
    models::{
        CustomConfiguration, PreflightResponse, TokenErrorBody, TokenRequest, TokenResponse,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::State,
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use coach_core::realtime_config::{
    DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_REALTIME_MODEL, DEFAULT_TEMPERATURE,
    SUPPORTED_REALTIME_MODELS, compose_instructions,
};
use serde::Deserialize;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};

const MINT_TIMEOUT: Duration = Duration::from_secs(30);
const TOKEN_VOICE: &str = "alloy";
const TOKEN_TTL_SECS: i64 = 3600;

const CORS_HEADERS: [(HeaderName, &str); 4] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        "Content-Type,X-Amz-Date,Authorization,X-Api-Key,X-Amz-Security-Token",
    ),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "GET,POST,OPTIONS"),
    (header::CONTENT_TYPE, "application/json"),
];

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("OPENAI_API_KEY is not configured")]
    MissingApiKey,
    #[error("upstream returned status {0}")]
    Upstream(u16),
    #[error("upstream request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed upstream response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for TokenError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TokenError::Timeout
        } else {
            TokenError::Network(e.to_string())
        }
    }
}

impl IntoResponse for TokenError {
    fn into_response(self) -> Response {
        error!(error = %self, "Token minting failed");
        let (status, error, message, details) = match &self {
            TokenError::Upstream(code) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create OpenAI session",
                "Please try again in a few moments",
                Some(format!("OpenAI API returned {code}")),
            ),
            TokenError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "Request timeout",
                "OpenAI API request timed out, please try again",
                None,
            ),
            TokenError::Network(_) => (
                StatusCode::BAD_GATEWAY,
                "Network error",
                "Unable to connect to OpenAI API",
                None,
            ),
            TokenError::MissingApiKey | TokenError::InvalidResponse(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                "An unexpected error occurred",
                None,
            ),
        };
        let body = TokenErrorBody {
            success: false,
            error: error.to_string(),
            message: message.to_string(),
            details,
        };
        (status, CORS_HEADERS, Json(body)).into_response()
    }
}

/// The resolved parameters of one mint request.
#[derive(Debug, Clone, PartialEq)]
pub struct MintPlan {
    pub instructions: String,
    pub temperature: f64,
    pub model: String,
    pub custom_feedback: bool,
    pub custom_grade: bool,
}

/// Parses an optional request body. Anything unparsable counts as no overrides.
pub fn parse_token_request(body: &[u8]) -> TokenRequest {
    if body.iter().all(u8::is_ascii_whitespace) {
        return TokenRequest::default();
    }
    serde_json::from_slice(body).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to parse token request body; using defaults");
        TokenRequest::default()
    })
}

/// Applies defaults and validation to the caller's overrides.
pub fn resolve(request: TokenRequest) -> MintPlan {
    let feedback = non_blank(request.feedback_instructions);
    let grade = non_blank(request.grade_instructions);

    let temperature = match request.feedback_temperature {
        None => DEFAULT_TEMPERATURE,
        Some(value) => match value.as_f64().filter(|t| (0.0..=2.0).contains(t)) {
            Some(t) => t,
            None => {
                warn!(
                    %value,
                    default = DEFAULT_TEMPERATURE,
                    "Invalid temperature value, using default"
                );
                DEFAULT_TEMPERATURE
            }
        },
    };

    let model = match request.feedback_model {
        None => DEFAULT_REALTIME_MODEL.to_string(),
        Some(model) if SUPPORTED_REALTIME_MODELS.contains(&model.as_str()) => model,
        Some(model) => {
            warn!(
                %model,
                default = DEFAULT_REALTIME_MODEL,
                "Model does not support realtime speech-to-speech, using default"
            );
            DEFAULT_REALTIME_MODEL.to_string()
        }
    };

    MintPlan {
        instructions: compose_instructions(feedback.as_deref(), grade.as_deref()),
        temperature,
        model,
        custom_feedback: feedback.is_some(),
        custom_grade: grade.is_some(),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Deserialize)]
struct MintedSession {
    id: String,
    client_secret: ClientSecret,
    expires_at: Option<i64>,
    model: Option<String>,
    voice: Option<String>,
}

#[derive(Deserialize)]
struct ClientSecret {
    value: String,
}

/// Creates an ephemeral realtime session upstream.
pub async fn mint(
    http: &reqwest::Client,
    api_base: &str,
    api_key: Option<&str>,
    plan: &MintPlan,
) -> Result<TokenResponse, TokenError> {
    let api_key = api_key.ok_or(TokenError::MissingApiKey)?;
    let body = json!({
        "model": plan.model,
        "modalities": ["text", "audio"],
        "voice": TOKEN_VOICE,
        "instructions": plan.instructions,
        "input_audio_format": "pcm16",
        "output_audio_format": "pcm16",
        "input_audio_transcription": { "model": "whisper-1" },
        "turn_detection": null,
        "temperature": plan.temperature,
        "max_response_output_tokens": DEFAULT_MAX_OUTPUT_TOKENS,
    });

    let response = http
        .post(format!("{api_base}/realtime/sessions"))
        .bearer_auth(api_key)
        .header("OpenAI-Beta", "realtime=v1")
        .json(&body)
        .timeout(MINT_TIMEOUT)
        .send()
        .await?;

    let status = response.status();
    info!(status = status.as_u16(), "Realtime session request answered");
    if status != reqwest::StatusCode::OK {
        let text = response.text().await.unwrap_or_default();
        error!(status = status.as_u16(), body = %text, "Upstream refused to create a session");
        return Err(TokenError::Upstream(status.as_u16()));
    }

    let session: MintedSession = response
        .json()
        .await
        .map_err(|e| TokenError::InvalidResponse(e.to_string()))?;
    info!(session_id = %session.id, "Ephemeral session created");

    Ok(TokenResponse {
        success: true,
        ephemeral_token: session.client_secret.value,
        session_id: session.id,
        expires_at: session
            .expires_at
            .unwrap_or_else(|| chrono::Utc::now().timestamp() + TOKEN_TTL_SECS),
        model: session.model.unwrap_or_else(|| plan.model.clone()),
        voice: session.voice.unwrap_or_else(|| TOKEN_VOICE.to_string()),
        temperature: plan.temperature,
        instructions_length: plan.instructions.chars().count(),
        custom_configuration: CustomConfiguration {
            feedback_instructions: plan.custom_feedback,
            grade_instructions: plan.custom_grade,
            feedback_temperature: plan.temperature,
            feedback_model: plan.model.clone(),
        },
        message: "Ephemeral token created successfully with dynamic configuration".to_string(),
    })
}

/// Mint an ephemeral realtime credential for direct browser use.
#[utoipa::path(
    post,
    path = "/api/token",
    request_body(content = TokenRequest, description = "Optional instruction overrides"),
    responses(
        (status = 200, description = "Ephemeral token created", body = TokenResponse),
        (
            status = 500,
            description = "Upstream refused or server misconfigured",
            body = TokenErrorBody
        ),
        (status = 502, description = "Upstream unreachable", body = TokenErrorBody),
        (status = 504, description = "Upstream timed out", body = TokenErrorBody)
    )
)]
pub async fn mint_token(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let plan = resolve(parse_token_request(&body));
    info!(
        model = %plan.model,
        temperature = plan.temperature,
        instructions_len = plan.instructions.len(),
        "Minting ephemeral token"
    );

    match mint(
        &state.http,
        &state.config.api_base,
        state.config.openai_api_key.as_deref(),
        &plan,
    )
    .await
    {
        Ok(token) => (StatusCode::OK, CORS_HEADERS, Json(token)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// CORS preflight for the token endpoint.
#[utoipa::path(
    options,
    path = "/api/token",
    responses((status = 200, description = "Preflight accepted", body = PreflightResponse))
)]
pub async fn token_preflight() -> Response {
    let body = PreflightResponse {
        message: "CORS preflight successful".to_string(),
    };
    (StatusCode::OK, CORS_HEADERS, Json(body)).into_response()
}
