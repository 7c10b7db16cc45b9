//! Defines the WebSocket message protocol between the browser client and the API server.
//!
//! Audio travels as binary frames in both directions. Text frames carry the
//! JSON messages below.

use coach_core::{
    realtime_config::{RealtimeConfig, ResponseType, SUPPORTED_REALTIME_MODELS, Voice},
    session::FeedbackSnapshot,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Commands sent from the client (browser) as text frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    /// Flush buffered audio and ask for a response.
    CommitAudio,
    /// Accepted for compatibility; configuration is fixed at connect time.
    Configure,
    /// Request the latest grade and feedback.
    GetFeedback,
}

impl ClientCommand {
    /// Parses a text frame. Unknown `type` values yield `Ok(None)`; only
    /// malformed JSON is an error.
    pub fn parse(text: &str) -> Result<Option<Self>, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        Ok(match value.get("type").and_then(Value::as_str) {
            Some("commit_audio") => Some(Self::CommitAudio),
            Some("configure") => Some(Self::Configure),
            Some("get_feedback") => Some(Self::GetFeedback),
            _ => None,
        })
    }
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The latest grading outcome. Every field is `null` until something has been graded.
    TrainingFeedback {
        grade: Option<u8>,
        feedback: Option<String>,
        full_response: Option<String>,
    },
    /// Sent once, right before the server closes the connection after a failure.
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl ServerMessage {
    pub fn internal_error(details: impl Into<String>) -> Self {
        ServerMessage::Error {
            error: "Internal server error".to_string(),
            details: Some(details.into()),
        }
    }
}

impl From<FeedbackSnapshot> for ServerMessage {
    fn from(snapshot: FeedbackSnapshot) -> Self {
        ServerMessage::TrainingFeedback {
            grade: snapshot.grade,
            feedback: snapshot.feedback,
            full_response: snapshot.full_response,
        }
    }
}

/// Optional session settings passed as query parameters on the speech socket.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ConnectParams {
    pub voice: Option<Voice>,
    pub response_type: Option<ResponseType>,
    pub temperature: Option<f64>,
    pub model: Option<String>,
}

impl ConnectParams {
    pub fn is_empty(&self) -> bool {
        self.voice.is_none()
            && self.response_type.is_none()
            && self.temperature.is_none()
            && self.model.is_none()
    }

    /// Builds the client-supplied configuration, or `None` when nothing was
    /// supplied. Out-of-range values fall back to the defaults.
    pub fn into_config(self, default_model: &str) -> Option<RealtimeConfig> {
        if self.is_empty() {
            return None;
        }

        let mut config = RealtimeConfig {
            model: default_model.to_string(),
            ..Default::default()
        };
        if let Some(voice) = self.voice {
            config.voice = voice;
        }
        if let Some(response_type) = self.response_type {
            config.response_type = response_type;
        }
        match self.temperature {
            Some(t) if (0.0..=2.0).contains(&t) => config.temperature = t,
            Some(t) => warn!(temperature = t, "Ignoring out-of-range temperature"),
            None => {}
        }
        match self.model {
            Some(model) if SUPPORTED_REALTIME_MODELS.contains(&model.as_str()) => {
                config.model = model
            }
            Some(model) => warn!(%model, "Ignoring unsupported realtime model"),
            None => {}
        }
        Some(config)
    }
}
