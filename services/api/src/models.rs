//! API Models
//!
//! Request and response bodies of the HTTP surface. They double as the
//! OpenAPI schemas generated with `utoipa`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    #[schema(example = "deescalation-coach")]
    pub service: String,
    #[schema(example = "dev")]
    pub environment: String,
    pub host: String,
    pub port: u16,
    #[schema(example = "ws")]
    pub websocket_protocol: String,
    pub openai_key_configured: bool,
    pub active_connections: usize,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct WsHealthResponse {
    pub status: String,
    pub active_connections: usize,
    #[schema(example = "websocket-handler")]
    pub service: String,
}

/// Optional overrides for an ephemeral session. Every field may be omitted.
#[derive(Deserialize, ToSchema, Debug, Default, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenRequest {
    pub feedback_instructions: Option<String>,
    pub grade_instructions: Option<String>,
    /// Any JSON value is accepted here; non-numeric or out-of-range values use the default.
    #[schema(value_type = Option<f64>, example = 0.8)]
    pub feedback_temperature: Option<Value>,
    #[schema(example = "gpt-4o-realtime-preview-2024-10-01")]
    pub feedback_model: Option<String>,
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomConfiguration {
    pub feedback_instructions: bool,
    pub grade_instructions: bool,
    pub feedback_temperature: f64,
    pub feedback_model: String,
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub success: bool,
    pub ephemeral_token: String,
    pub session_id: String,
    /// Unix timestamp, seconds.
    pub expires_at: i64,
    pub model: String,
    pub voice: String,
    pub temperature: f64,
    pub instructions_length: usize,
    pub custom_configuration: CustomConfiguration,
    pub message: String,
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct TokenErrorBody {
    pub success: bool,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct PreflightResponse {
    pub message: String,
}
