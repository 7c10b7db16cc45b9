//! Upstream Link: the outbound realtime connection owned by one client session.
//!
//! The link splits the upstream socket. The write half sits behind the
//! [`EventSender`] seam; the read half is consumed once, by [`UpstreamLink::listen`],
//! which feeds every event through the core interpreter in arrival order.

use super::error::{ConnectError, ConnectionError, SendError};
use crate::{config::Config, state::SessionTimings};
use async_trait::async_trait;
use bytes::Bytes;
use coach_core::{
    audio::encode_audio,
    events::{ClientEvent, ServerEvent},
    interpreter::{Effect, interpret},
    realtime_config::RealtimeConfig,
    session::{FeedbackSnapshot, Session, SessionState},
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{BoxStream, SplitSink},
};
use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, Ordering},
};
use tokio::{
    net::TcpStream,
    sync::{Mutex, mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        self, Message,
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
    },
};
use tracing::{debug, error, info, warn};

type UpstreamSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Inbound half of the upstream socket.
pub type UpstreamEvents = BoxStream<'static, Result<Message, tungstenite::Error>>;

/// Where and how to reach the realtime API.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub default_model: String,
}

impl UpstreamSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.realtime_url.clone(),
            api_key: config.openai_api_key.clone(),
            default_model: config.realtime_model.clone(),
        }
    }
}

/// Write half of the upstream connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSender: Send + Sync {
    async fn send(&self, event: ClientEvent) -> Result<(), SendError>;
    async fn close(&self);
}

struct WsEventSender {
    sink: Mutex<UpstreamSink>,
}

#[async_trait]
impl EventSender for WsEventSender {
    async fn send(&self, event: ClientEvent) -> Result<(), SendError> {
        let payload = serde_json::to_string(&event)?;
        self.sink
            .lock()
            .await
            .send(Message::Text(payload.into()))
            .await
            .map_err(SendError::Transport)
    }

    async fn close(&self) {
        if let Err(e) = self.sink.lock().await.close().await {
            debug!(error = %e, "Upstream socket was already closed");
        }
    }
}

pub struct UpstreamLink {
    sender: Arc<dyn EventSender>,
    events: Mutex<Option<UpstreamEvents>>,
    session: Mutex<Session>,
    config: Option<RealtimeConfig>,
    timings: SessionTimings,
    timers: Mutex<Vec<JoinHandle<()>>>,
    transport_closed: AtomicBool,
    state_tx: watch::Sender<SessionState>,
}

impl UpstreamLink {
    /// Opens the upstream connection and arms the configuration fallback.
    pub async fn connect(
        settings: &UpstreamSettings,
        config: Option<RealtimeConfig>,
        timings: SessionTimings,
    ) -> Result<Arc<Self>, ConnectError> {
        let api_key = settings
            .api_key
            .as_deref()
            .ok_or(ConnectError::MissingCredentials)?;
        let model = config
            .as_ref()
            .map_or(settings.default_model.as_str(), |c| c.model.as_str());

        let mut request = format!("{}?model={}", settings.url, model)
            .into_client_request()
            .map_err(|e| ConnectError::InvalidRequest(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| ConnectError::InvalidRequest(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let mut session = Session::new();
        session.start_connecting();
        info!(
            %model,
            url = %settings.url,
            state = ?session.state,
            "Connecting to realtime upstream"
        );
        let (stream, _) = connect_async(request).await?;
        let (sink, events) = stream.split();
        session.mark_connected();
        info!(state = ?session.state, "Connected to realtime upstream");

        let sender = Arc::new(WsEventSender {
            sink: Mutex::new(sink),
        });
        let link = Self::with_session(sender, events.boxed(), session, config, timings);
        link.schedule_config_fallback().await;
        Ok(link)
    }

    /// Builds a link over an already-established connection.
    pub fn from_parts(
        sender: Arc<dyn EventSender>,
        events: UpstreamEvents,
        config: Option<RealtimeConfig>,
        timings: SessionTimings,
    ) -> Arc<Self> {
        let mut session = Session::new();
        session.start_connecting();
        session.mark_connected();
        Self::with_session(sender, events, session, config, timings)
    }

    fn with_session(
        sender: Arc<dyn EventSender>,
        events: UpstreamEvents,
        session: Session,
        config: Option<RealtimeConfig>,
        timings: SessionTimings,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(session.state);
        Arc::new(Self {
            sender,
            events: Mutex::new(Some(events)),
            session: Mutex::new(session),
            config,
            timings,
            timers: Mutex::new(Vec::new()),
            transport_closed: AtomicBool::new(false),
            state_tx,
        })
    }

    /// Sends configuration after `config_fallback` unless the upstream has
    /// announced a session by then, with or without an id.
    pub(crate) async fn schedule_config_fallback(self: &Arc<Self>) {
        let link = Arc::downgrade(self);
        let delay = self.timings.config_fallback;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(link) = link.upgrade() else { return };
            let needs_config = {
                let session = link.session.lock().await;
                !session.was_created() && !session.state.is_terminal()
            };
            if needs_config {
                warn!(
                    delay_ms = delay.as_millis() as u64,
                    "No session.created received; sending configuration"
                );
                if let Err(e) = link.send_configuration().await {
                    error!(error = %e, "Fallback configuration failed");
                }
            }
        });
        self.track_timer(timer).await;
    }

    /// Appends one chunk of client audio to the upstream input buffer.
    pub async fn send_audio_chunk(&self, chunk: &[u8]) -> Result<(), SendError> {
        self.ensure_connected().await?;
        debug!(bytes = chunk.len(), "Appending audio upstream");
        self.sender
            .send(ClientEvent::InputAudioBufferAppend {
                audio: encode_audio(chunk),
            })
            .await
    }

    /// Commits the input buffer and requests a response, unless a response is
    /// already pending, in which case this is a successful no-op.
    pub async fn commit_audio_buffer(self: &Arc<Self>) -> Result<(), SendError> {
        self.ensure_connected().await?;
        let Some(cycle) = self.session.lock().await.begin_response() else {
            info!("Response already in progress; skipping commit");
            return Ok(());
        };

        let sent = async {
            self.sender.send(ClientEvent::InputAudioBufferCommit).await?;
            self.sender.send(ClientEvent::ResponseCreate).await
        }
        .await;
        if let Err(e) = sent {
            self.session.lock().await.expire_response(cycle);
            return Err(e);
        }
        info!(cycle, "Committed audio buffer and requested a response");

        let link: Weak<Self> = Arc::downgrade(self);
        let timeout = self.timings.response_timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(link) = link.upgrade() else { return };
            if link.session.lock().await.expire_response(cycle) {
                warn!(
                    cycle,
                    timeout_ms = timeout.as_millis() as u64,
                    "No response.done received; clearing pending response"
                );
            }
        });
        self.track_timer(timer).await;
        Ok(())
    }

    /// Sends the supplied configuration, or the default one.
    pub async fn send_configuration(&self) -> Result<(), SendError> {
        self.ensure_connected().await?;
        let session = match &self.config {
            Some(config) => config.session_update(),
            None => RealtimeConfig::default().session_update(),
        };
        info!(
            supplied = self.config.is_some(),
            modalities = ?session.modalities,
            "Sending session configuration"
        );
        self.sender.send(ClientEvent::SessionUpdate { session }).await
    }

    /// Consumes upstream events until the connection ends. Decoded response
    /// audio is forwarded on `audio`.
    ///
    /// A normal close ends with `Ok`. The event stream can be consumed once;
    /// later calls return immediately.
    pub async fn listen(
        self: Arc<Self>,
        audio: mpsc::Sender<Bytes>,
    ) -> Result<(), ConnectionError> {
        let Some(mut events) = self.events.lock().await.take() else {
            warn!("Upstream events are already being consumed");
            return Ok(());
        };

        let result = loop {
            let Some(message) = events.next().await else {
                info!("Upstream event stream ended");
                break Ok(());
            };
            match message {
                Ok(Message::Text(text)) => self.handle_event(text.as_str(), &audio).await,
                Ok(Message::Close(frame)) => {
                    info!(?frame, "Upstream closed the connection");
                    break Ok(());
                }
                Ok(_) => {}
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    info!("Upstream connection closed");
                    break Ok(());
                }
                Err(e) => {
                    error!(error = %e, "Upstream connection failed");
                    break Err(ConnectionError::from(e));
                }
            }
        };

        self.session.lock().await.state = SessionState::Closed;
        self.publish(SessionState::Closed);
        result
    }

    async fn handle_event(&self, text: &str, audio: &mpsc::Sender<Bytes>) {
        let event = match ServerEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable upstream event");
                return;
            }
        };

        let (effects, state) = {
            let mut session = self.session.lock().await;
            let effects = interpret(&mut session, event);
            (effects, session.state)
        };
        self.publish(state);

        for effect in effects {
            match effect {
                Effect::Configure => {
                    if let Err(e) = self.send_configuration().await {
                        error!(error = %e, "Failed to send session configuration");
                    }
                }
                Effect::Audio(chunk) => {
                    if audio.send(chunk).await.is_err() {
                        debug!("Client audio channel closed; dropping response audio");
                    }
                }
            }
        }
    }

    /// Cancels pending timers and closes the transport. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        for timer in self.timers.lock().await.drain(..) {
            timer.abort();
        }

        let already_closed = {
            let mut session = self.session.lock().await;
            let already_closed = session.state == SessionState::Closed;
            if !session.state.is_terminal() {
                session.state = SessionState::Closing;
            }
            already_closed
        };
        if !already_closed {
            self.publish(SessionState::Closing);
        }

        if !self.transport_closed.swap(true, Ordering::SeqCst) {
            self.sender.close().await;
            let counts = self.session.lock().await.event_counts().clone();
            info!(events = ?counts, "Disconnected from realtime upstream");
        }

        self.session.lock().await.state = SessionState::Closed;
        self.publish(SessionState::Closed);
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Observes lifecycle transitions.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub async fn feedback(&self) -> FeedbackSnapshot {
        self.session.lock().await.feedback_snapshot()
    }

    pub async fn has_pending_response(&self) -> bool {
        self.session.lock().await.has_active_response()
    }

    pub async fn session_id(&self) -> Option<String> {
        self.session.lock().await.id.clone()
    }

    async fn ensure_connected(&self) -> Result<(), SendError> {
        if self.session.lock().await.state.is_connected() {
            Ok(())
        } else {
            Err(SendError::NotConnected)
        }
    }

    async fn track_timer(&self, timer: JoinHandle<()>) {
        let mut timers = self.timers.lock().await;
        timers.retain(|t| !t.is_finished());
        timers.push(timer);
    }

    fn publish(&self, state: SessionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                debug!(from = ?*current, to = ?state, "Session state changed");
                *current = state;
                true
            }
        });
    }
}
