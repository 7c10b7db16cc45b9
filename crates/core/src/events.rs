//! Upstream realtime protocol messages.
//!
//! Outbound control messages are strongly typed. Inbound events are decoded from
//! raw JSON by their `type` label; unrecognized events keep their raw payload
//! because transcripts sometimes turn up in event types we do not model.

use crate::realtime_config::SessionUpdate;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event has no `type` field")]
    MissingType,
    #[error("invalid base64 audio payload: {0}")]
    Audio(#[from] base64::DecodeError),
}

/// Messages sent to the upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionUpdate },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionUpdate { .. } => "session.update",
            Self::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
            Self::InputAudioBufferCommit => "input_audio_buffer.commit",
            Self::ResponseCreate => "response.create",
        }
    }
}

/// Events received from the upstream.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    SessionCreated { session_id: Option<String> },
    SessionUpdated { session: Value },
    InputAudioBufferCommitted,
    InputAudioBufferSpeechStarted,
    InputAudioBufferSpeechStopped,
    AudioDelta { delta: Option<String> },
    AudioDone,
    TranscriptDelta { delta: Option<String> },
    TranscriptDone { transcript: Option<String> },
    TextDelta { delta: Option<String> },
    TextDone,
    OutputItemDone { item: Value },
    ResponseDone,
    Error { error: Value },
    Other { event_type: String, raw: Value },
}

impl ServerEvent {
    /// Decodes one text frame from the upstream.
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn from_value(raw: Value) -> Result<Self, DecodeError> {
        let event_type = raw
            .get("type")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingType)?
            .to_string();

        let event = match event_type.as_str() {
            "session.created" => Self::SessionCreated {
                session_id: raw
                    .get("session")
                    .and_then(|s| s.get("id"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            "session.updated" => Self::SessionUpdated {
                session: raw.get("session").cloned().unwrap_or(Value::Null),
            },
            "input_audio_buffer.committed" => Self::InputAudioBufferCommitted,
            "input_audio_buffer.speech_started" => Self::InputAudioBufferSpeechStarted,
            "input_audio_buffer.speech_stopped" => Self::InputAudioBufferSpeechStopped,
            "response.audio.delta" => Self::AudioDelta {
                delta: string_field(&raw, "delta"),
            },
            "response.audio.done" => Self::AudioDone,
            "response.audio_transcript.delta" => Self::TranscriptDelta {
                delta: string_field(&raw, "delta"),
            },
            "response.audio_transcript.done" => Self::TranscriptDone {
                transcript: string_field(&raw, "transcript"),
            },
            "response.text.delta" => Self::TextDelta {
                delta: string_field(&raw, "delta"),
            },
            "response.text.done" => Self::TextDone,
            "response.output_item.done" => Self::OutputItemDone {
                item: raw.get("item").cloned().unwrap_or(Value::Null),
            },
            "response.done" => Self::ResponseDone,
            "error" => Self::Error {
                error: raw.get("error").cloned().unwrap_or(Value::Null),
            },
            _ => Self::Other {
                event_type: event_type.clone(),
                raw,
            },
        };
        Ok(event)
    }

    pub fn event_type(&self) -> &str {
        match self {
            Self::SessionCreated { .. } => "session.created",
            Self::SessionUpdated { .. } => "session.updated",
            Self::InputAudioBufferCommitted => "input_audio_buffer.committed",
            Self::InputAudioBufferSpeechStarted => "input_audio_buffer.speech_started",
            Self::InputAudioBufferSpeechStopped => "input_audio_buffer.speech_stopped",
            Self::AudioDelta { .. } => "response.audio.delta",
            Self::AudioDone => "response.audio.done",
            Self::TranscriptDelta { .. } => "response.audio_transcript.delta",
            Self::TranscriptDone { .. } => "response.audio_transcript.done",
            Self::TextDelta { .. } => "response.text.delta",
            Self::TextDone => "response.text.done",
            Self::OutputItemDone { .. } => "response.output_item.done",
            Self::ResponseDone => "response.done",
            Self::Error { .. } => "error",
            Self::Other { event_type, .. } => event_type,
        }
    }
}

fn string_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

fn non_empty_transcript(value: &Value) -> Option<&str> {
    value
        .get("transcript")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
}

/// First non-empty `transcript` in a `content` array of objects.
pub fn content_transcript(container: &Value) -> Option<&str> {
    container
        .get("content")
        .and_then(Value::as_array)?
        .iter()
        .find_map(non_empty_transcript)
}

/// Looks for a transcript at the top level, inside a `part` object, or inside
/// a `content` array, in that order. A top-level `transcript` key ends the
/// search even when its value is empty.
pub fn embedded_transcript(raw: &Value) -> Option<&str> {
    if raw.get("transcript").is_some() {
        return non_empty_transcript(raw);
    }
    raw.get("part")
        .and_then(non_empty_transcript)
        .or_else(|| content_transcript(raw))
}
