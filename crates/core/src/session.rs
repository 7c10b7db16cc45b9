//! Per-connection session state.
//!
//! One `Session` exists per client connection. The event interpreter and the
//! upstream link mutate it; the session bridge reads feedback snapshots from it.

use crate::feedback::Feedback;
use serde::Serialize;
use std::collections::BTreeMap;

/// Lifecycle of the upstream side of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, not yet connecting.
    #[default]
    Idle,
    /// Upstream handshake in flight.
    Connecting,
    /// Connected; configuration not yet acknowledged.
    Configuring,
    /// Configuration acknowledged by the upstream.
    Active,
    /// Teardown started.
    Closing,
    Closed,
}

impl SessionState {
    /// Audio and control messages may only be sent in these states.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Configuring | Self::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

/// Identifies one commit/`response.create` request so that a stale timeout
/// cannot clear a newer cycle.
pub type CycleId = u64;

/// The latest grading outcome, as reported to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedbackSnapshot {
    pub grade: Option<u8>,
    pub feedback: Option<String>,
    pub full_response: Option<String>,
}

#[derive(Debug, Default)]
pub struct Session {
    pub id: Option<String>,
    pub state: SessionState,
    /// Transcript accumulated from `response.audio_transcript.delta`. Not reset
    /// between response cycles.
    pub transcript: String,
    /// Text accumulated from `response.text.delta`; cleared once graded.
    pub text_buffer: String,
    created: bool,
    pending_cycle: Option<CycleId>,
    next_cycle: CycleId,
    last_feedback: Option<Feedback>,
    event_counts: BTreeMap<String, u64>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idle -> Connecting. Returns false from any other state.
    pub fn start_connecting(&mut self) -> bool {
        self.transition(SessionState::Idle, SessionState::Connecting)
    }

    /// Connecting -> Configuring, once the upstream handshake has completed.
    pub fn mark_connected(&mut self) -> bool {
        self.transition(SessionState::Connecting, SessionState::Configuring)
    }

    fn transition(&mut self, from: SessionState, to: SessionState) -> bool {
        if self.state == from {
            self.state = to;
            true
        } else {
            false
        }
    }

    /// Records the upstream's `session.created`. The id is optional on the wire.
    pub fn mark_created(&mut self, id: Option<String>) {
        self.id = id;
        self.created = true;
    }

    /// Whether `session.created` has been seen, with or without an id.
    pub fn was_created(&self) -> bool {
        self.created
    }

    pub fn has_active_response(&self) -> bool {
        self.pending_cycle.is_some()
    }

    /// Starts a response cycle, or returns `None` if one is already pending.
    pub fn begin_response(&mut self) -> Option<CycleId> {
        if self.pending_cycle.is_some() {
            return None;
        }
        self.next_cycle += 1;
        self.pending_cycle = Some(self.next_cycle);
        self.pending_cycle
    }

    /// Clears the pending cycle when the upstream reports completion.
    pub fn complete_response(&mut self) -> bool {
        self.pending_cycle.take().is_some()
    }

    /// Clears `cycle` if it is still the pending one. Returns whether it was.
    pub fn expire_response(&mut self, cycle: CycleId) -> bool {
        if self.pending_cycle == Some(cycle) {
            self.pending_cycle = None;
            true
        } else {
            false
        }
    }

    /// Overwrites the last grading outcome. No history is kept.
    pub fn record_feedback(&mut self, feedback: Feedback) {
        self.last_feedback = Some(feedback);
    }

    pub fn last_grade(&self) -> Option<u8> {
        self.last_feedback.as_ref().map(|f| f.grade)
    }

    pub fn feedback_snapshot(&self) -> FeedbackSnapshot {
        match &self.last_feedback {
            Some(f) => FeedbackSnapshot {
                grade: Some(f.grade),
                feedback: Some(f.feedback.clone()),
                full_response: Some(f.full_response.clone()),
            },
            None => FeedbackSnapshot::default(),
        }
    }

    /// Counts an inbound event and returns its running count.
    pub fn record_event(&mut self, event_type: &str) -> u64 {
        let count = self.event_counts.entry(event_type.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn event_counts(&self) -> &BTreeMap<String, u64> {
        &self.event_counts
    }
}
