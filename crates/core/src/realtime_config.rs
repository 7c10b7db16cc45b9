//! Realtime session configuration and the coaching instructions sent upstream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview-2024-10-01";
pub const DEFAULT_TEMPERATURE: f64 = 0.8;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;

/// Models able to run speech-to-speech sessions.
pub const SUPPORTED_REALTIME_MODELS: [&str; 3] = [
    "gpt-4o-realtime-preview-2024-10-01",
    "gpt-4o-realtime-preview-2024-12-17",
    "gpt-4o-realtime-preview",
];

const COACH_PREAMBLE: &str = "You are an expert de-escalation training coach.";

const SKILL_FOCUS: &str = "Focus on these key de-escalation skills:
- Tone and voice modulation
- Active listening and empathy
- Calm and confident demeanor
- Clear communication
- Safety awareness
- Conflict resolution techniques";

const RATING_REQUIREMENT: &str = "CRITICAL: You MUST always include a numerical grade in your response using this exact format:
**Rating: X/10** (where X is a number from 1-10)";

const CLOSING: &str =
    "Always provide constructive feedback that helps users improve their de-escalation skills.";

/// The default coaching prompt.
pub fn default_instructions() -> String {
    format!(
        "{COACH_PREAMBLE} Your role is to:

1. Listen to the user's de-escalation attempt
2. Provide immediate constructive feedback
3. Grade their performance on a scale of 1-10
4. Offer specific guidance for improvement

{SKILL_FOCUS}

{RATING_REQUIREMENT}

Example response:
\"Your approach showed good empathy and calm tone. You maintained good communication throughout.

**Rating: 7/10**

For improvement: Try to be more confident in your delivery and provide specific next steps for the situation.\"

{CLOSING}"
    )
}

/// Builds instructions from optional caller overrides.
///
/// Without overrides this is [`default_instructions`]. A missing grading block
/// is replaced by the mandatory rating format, and a missing feedback block by
/// the default skill list.
pub fn compose_instructions(feedback: Option<&str>, grade: Option<&str>) -> String {
    let feedback = feedback.map(str::trim).filter(|s| !s.is_empty());
    let grade = grade.map(str::trim).filter(|s| !s.is_empty());
    if feedback.is_none() && grade.is_none() {
        return default_instructions();
    }

    let mut instructions = format!("{COACH_PREAMBLE}\n\n");
    if let Some(feedback) = feedback {
        instructions.push_str(&format!("FEEDBACK INSTRUCTIONS:\n{feedback}\n\n"));
    }
    match grade {
        Some(grade) => instructions.push_str(&format!("GRADING INSTRUCTIONS:\n{grade}\n\n")),
        None => instructions.push_str(&format!("{RATING_REQUIREMENT}\n\n")),
    }
    if feedback.is_none() {
        instructions.push_str(&format!("{SKILL_FOCUS}\n\n{CLOSING}"));
    }
    instructions
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    #[default]
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    #[default]
    Pcm16,
    G711Ulaw,
    G711Alaw,
}

/// Whether responses carry synthesized speech or text only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Text,
    #[default]
    Audio,
}

/// Configuration for one upstream realtime session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub model: String,
    pub voice: Voice,
    pub input_audio_format: AudioFormat,
    pub output_audio_format: AudioFormat,
    pub input_audio_transcription: Option<Value>,
    /// `None` means manual turns: the client decides when to commit.
    pub turn_detection: Option<Value>,
    pub tools: Vec<Value>,
    pub tool_choice: String,
    pub temperature: f64,
    pub max_response_output_tokens: u32,
    pub response_type: ResponseType,
    pub instructions: Option<String>,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_REALTIME_MODEL.to_string(),
            voice: Voice::default(),
            input_audio_format: AudioFormat::default(),
            output_audio_format: AudioFormat::default(),
            input_audio_transcription: None,
            turn_detection: None,
            tools: Vec::new(),
            tool_choice: "auto".to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_response_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            response_type: ResponseType::default(),
            instructions: None,
        }
    }
}

impl RealtimeConfig {
    /// Text is always requested so that a transcript is available for grading.
    pub fn modalities(&self) -> Vec<String> {
        let mut modalities = vec!["text".to_string()];
        if self.response_type == ResponseType::Audio {
            modalities.push("audio".to_string());
        }
        modalities
    }

    /// The `session` payload of a `session.update` message.
    pub fn session_update(&self) -> SessionUpdate {
        SessionUpdate {
            modalities: self.modalities(),
            instructions: self
                .instructions
                .clone()
                .unwrap_or_else(default_instructions),
            voice: self.voice,
            input_audio_format: self.input_audio_format,
            output_audio_format: self.output_audio_format,
            input_audio_transcription: self.input_audio_transcription.clone(),
            turn_detection: self.turn_detection.clone(),
            tools: self.tools.clone(),
            tool_choice: self.tool_choice.clone(),
            temperature: self.temperature,
            max_response_output_tokens: self.max_response_output_tokens,
        }
    }
}

/// Wire shape of the session configuration. Absent optional settings are sent
/// as explicit `null`s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub modalities: Vec<String>,
    pub instructions: String,
    pub voice: Voice,
    pub input_audio_format: AudioFormat,
    pub output_audio_format: AudioFormat,
    pub input_audio_transcription: Option<Value>,
    pub turn_detection: Option<Value>,
    pub tools: Vec<Value>,
    pub tool_choice: String,
    pub temperature: f64,
    pub max_response_output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = RealtimeConfig::default();
        assert_eq!(config.model, DEFAULT_REALTIME_MODEL);
        assert_eq!(config.voice, Voice::Alloy);
        assert_eq!(config.input_audio_format, AudioFormat::Pcm16);
        assert_eq!(config.tool_choice, "auto");
        assert_eq!(config.max_response_output_tokens, 4096);
        assert!(config.turn_detection.is_none());
        assert_eq!(config.modalities(), vec!["text", "audio"]);
    }

    #[test]
    fn test_text_only_modalities() {
        let config = RealtimeConfig {
            response_type: ResponseType::Text,
            ..Default::default()
        };
        assert_eq!(config.modalities(), vec!["text"]);
    }

    #[test]
    fn test_session_update_serialization() {
        let update = RealtimeConfig {
            voice: Voice::Shimmer,
            output_audio_format: AudioFormat::G711Ulaw,
            ..Default::default()
        }
        .session_update();
        let value = serde_json::to_value(&update).unwrap();

        assert_eq!(value["voice"], "shimmer");
        assert_eq!(value["input_audio_format"], "pcm16");
        assert_eq!(value["output_audio_format"], "g711_ulaw");
        assert_eq!(value["modalities"], json!(["text", "audio"]));
        // Manual turn detection must be an explicit null, not an omitted key.
        assert!(value.as_object().unwrap().contains_key("turn_detection"));
        assert!(value["turn_detection"].is_null());
        assert_eq!(value["tools"], json!([]));
        assert!(value["instructions"].as_str().unwrap().contains("**Rating: X/10**"));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: RealtimeConfig =
            serde_json::from_value(json!({ "voice": "echo", "response_type": "text" })).unwrap();
        assert_eq!(config.voice, Voice::Echo);
        assert_eq!(config.response_type, ResponseType::Text);
        assert_eq!(config.model, DEFAULT_REALTIME_MODEL);
    }

    #[test]
    fn test_compose_instructions_defaults() {
        assert_eq!(compose_instructions(None, None), default_instructions());
        assert_eq!(compose_instructions(Some("  "), Some("")), default_instructions());
    }

    #[test]
    fn test_compose_instructions_with_feedback_only() {
        let text = compose_instructions(Some("Be brief."), None);
        assert!(text.starts_with(COACH_PREAMBLE));
        assert!(text.contains("FEEDBACK INSTRUCTIONS:\nBe brief."));
        assert!(text.contains("**Rating: X/10**"));
        assert!(!text.contains("GRADING INSTRUCTIONS"));
        assert!(!text.contains("Focus on these key"));
    }

    #[test]
    fn test_compose_instructions_with_grade_only() {
        let text = compose_instructions(None, Some("Grade strictly."));
        assert!(text.contains("GRADING INSTRUCTIONS:\nGrade strictly."));
        assert!(!text.contains("CRITICAL"));
        assert!(text.contains("Focus on these key de-escalation skills"));
    }
}
