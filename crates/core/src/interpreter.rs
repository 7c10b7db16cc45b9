//! Upstream Event Interpreter
//!
//! Applies one decoded upstream event to a [`Session`]. The interpreter performs
//! no I/O: anything that has to leave the process is returned as an [`Effect`]
//! for the caller to carry out. It holds no state of its own and never fails,
//! so a bad event cannot end the listen loop.

use crate::{
    audio::decode_audio,
    events::{DecodeError, ServerEvent, content_transcript, embedded_transcript},
    feedback::extract_feedback,
    session::{Session, SessionState},
};
use bytes::Bytes;
use tracing::{debug, error, info, warn};

/// Work requested by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send the session configuration upstream.
    Configure,
    /// Forward decoded response audio to the client, unbatched.
    Audio(Bytes),
}

/// Applies `event` to `session` and returns the effects it calls for.
pub fn interpret(session: &mut Session, event: ServerEvent) -> Vec<Effect> {
    let count = session.record_event(event.event_type());
    debug!(event_type = event.event_type(), count, "Received upstream event");

    let mut effects = Vec::new();
    match event {
        ServerEvent::TranscriptDelta { delta } => match delta {
            Some(delta) if !delta.is_empty() => session.transcript.push_str(&delta),
            _ => warn!("Transcript delta event carried no text"),
        },
        ServerEvent::TranscriptDone { transcript } => match transcript {
            Some(transcript) if !transcript.is_empty() => {
                info!(chars = transcript.len(), "Transcript complete");
                grade(session, &transcript);
            }
            _ => warn!("Transcript done event carried no transcript"),
        },
        ServerEvent::SessionCreated { session_id } => {
            info!(session_id = ?session_id, "Upstream session created");
            session.mark_created(session_id);
            effects.push(Effect::Configure);
        }
        ServerEvent::SessionUpdated { .. } => {
            if session.state == SessionState::Configuring {
                session.state = SessionState::Active;
            }
            info!("Upstream session configuration acknowledged");
        }
        ServerEvent::InputAudioBufferCommitted => debug!("Audio buffer committed"),
        ServerEvent::InputAudioBufferSpeechStarted => debug!("Speech started"),
        ServerEvent::InputAudioBufferSpeechStopped => debug!("Speech stopped"),
        ServerEvent::AudioDelta { delta } => {
            if let Some(delta) = delta {
                match decode_audio(&delta) {
                    Ok(audio) => {
                        debug!(bytes = audio.len(), "Received response audio");
                        effects.push(Effect::Audio(audio));
                    }
                    Err(e) => {
                        let e = DecodeError::from(e);
                        error!(error = %e, "Failed to decode response audio");
                    }
                }
            }
        }
        ServerEvent::AudioDone => debug!("Response audio complete"),
        ServerEvent::TextDelta { delta } => {
            if let Some(delta) = delta {
                session.text_buffer.push_str(&delta);
            }
        }
        ServerEvent::TextDone => grade_text_buffer(session),
        ServerEvent::OutputItemDone { item } => {
            if let Some(transcript) = content_transcript(&item) {
                info!(chars = transcript.len(), "Captured transcript from output item");
                grade(session, transcript);
            }
        }
        ServerEvent::ResponseDone => {
            session.complete_response();
            info!("Response complete");
            grade_text_buffer(session);
        }
        ServerEvent::Error { error } => error!(error = %error, "Upstream reported an error"),
        ServerEvent::Other { event_type, raw } => match embedded_transcript(&raw) {
            Some(transcript) => {
                info!(event_type = %event_type, "Captured transcript from unmodelled event");
                grade(session, transcript);
            }
            None => info!(event_type = %event_type, "Unhandled upstream event"),
        },
    }
    effects
}

fn grade(session: &mut Session, text: &str) {
    session.record_feedback(extract_feedback(text));
}

fn grade_text_buffer(session: &mut Session) {
    if session.text_buffer.is_empty() {
        return;
    }
    let text = std::mem::take(&mut session.text_buffer);
    grade(session, &text);
}
