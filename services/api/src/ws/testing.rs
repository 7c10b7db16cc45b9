//! Test doubles shared by the ws unit tests.

use super::{
    error::SendError,
    upstream::{EventSender, UpstreamLink},
};
use crate::state::SessionTimings;
use async_trait::async_trait;
use coach_core::events::ClientEvent;
use futures_util::{StreamExt, stream};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

/// Records every event instead of sending it.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<ClientEvent>>,
    closed: AtomicBool,
}

impl RecordingSender {
    pub fn events(&self) -> Vec<ClientEvent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(ClientEvent::event_type)
            .collect()
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSender for RecordingSender {
    async fn send(&self, event: ClientEvent) -> Result<(), SendError> {
        self.sent.lock().unwrap().push(event);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub fn short_timings() -> SessionTimings {
    SessionTimings {
        config_fallback: Duration::from_millis(30),
        response_timeout: Duration::from_millis(50),
        feedback_interval: Duration::from_millis(200),
    }
}

/// A link with no inbound events, backed by a [`RecordingSender`].
pub fn idle_link() -> (Arc<UpstreamLink>, Arc<RecordingSender>) {
    let sender = Arc::new(RecordingSender::default());
    let link = UpstreamLink::from_parts(
        sender.clone(),
        stream::empty().boxed(),
        None,
        SessionTimings::default(),
    );
    (link, sender)
}
