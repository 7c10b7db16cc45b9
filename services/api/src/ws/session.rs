//! Session Bridge: one client WebSocket joined to one upstream realtime session.
//!
//! Per connection three tasks run:
//! - the dispatch loop (this handler) reads client frames and drives the upstream link;
//! - the listener, owned by the registry, reads upstream events;
//! - the writer is the only task that touches the client sink.
//!
//! Whatever ends the dispatch loop, teardown goes through the registry once.

use super::{
    protocol::{ClientCommand, ConnectParams, ServerMessage},
    upstream::{UpstreamLink, UpstreamSettings},
};
use crate::state::AppState;
use anyhow::{Context, Result};
use axum::{
    extract::{
        Query, State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use bytes::Bytes;
use coach_core::{
    audio::{AudioPacer, MIN_CHUNK_BYTES},
    session::SessionState,
    throttle::FeedbackThrottle,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::{sync::Arc, time::Instant};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};
use uuid::Uuid;

/// Response audio chunks buffered between the listener and the client writer.
const AUDIO_CHANNEL_CAPACITY: usize = 64;
const FRAME_CHANNEL_CAPACITY: usize = 16;

/// Frames queued for the client writer.
#[derive(Debug)]
enum Outbound {
    Message(ServerMessage),
    Close { code: u16, reason: &'static str },
}

/// Why the dispatch loop stopped without an error.
#[derive(Debug, PartialEq, Eq)]
enum DispatchExit {
    ClientClosed,
    UpstreamClosed,
}

/// Axum handler to upgrade an HTTP connection to the speech WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

#[instrument(name = "ws_session", skip_all, fields(connection_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, params: ConnectParams) {
    let connection_id = Uuid::new_v4();
    tracing::Span::current().record("connection_id", tracing::field::display(connection_id));
    info!("New client connection");

    let (socket_tx, mut socket_rx) = socket.split();
    let (audio_tx, audio_rx) = mpsc::channel::<Bytes>(AUDIO_CHANNEL_CAPACITY);
    let (frame_tx, frame_rx) = mpsc::channel::<Outbound>(FRAME_CHANNEL_CAPACITY);
    let writer = tokio::spawn(
        run_client_writer(socket_tx, audio_rx, frame_rx).instrument(tracing::Span::current()),
    );

    let config = params.into_config(&state.config.realtime_model);
    let settings = UpstreamSettings::from_config(&state.config);
    let link = match UpstreamLink::connect(&settings, config, state.timings).await {
        Ok(link) => link,
        Err(e) => {
            error!(error = %e, "Failed to connect to realtime upstream");
            let _ = frame_tx
                .send(Outbound::Close {
                    code: close_code::ERROR,
                    reason: "Failed to connect to OpenAI",
                })
                .await;
            drop(frame_tx);
            drop(audio_tx);
            let _ = writer.await;
            return;
        }
    };

    state.registry.register(connection_id, link.clone()).await;
    let listener = tokio::spawn(
        {
            let link = link.clone();
            async move {
                match link.listen(audio_tx).await {
                    Ok(()) => info!("Upstream listener finished"),
                    Err(e) => warn!(error = %e, "Upstream listener stopped"),
                }
            }
        }
        .instrument(info_span!("upstream_listener", %connection_id)),
    );
    state.registry.add_task(connection_id, listener).await;

    match run_dispatch_loop(&mut socket_rx, &link, &frame_tx, &state).await {
        Ok(DispatchExit::ClientClosed) => info!("Client disconnected"),
        Ok(DispatchExit::UpstreamClosed) => {
            warn!("Upstream session ended; closing client connection");
            notify_error(&frame_tx, "Upstream connection closed").await;
        }
        Err(e) => {
            error!(error = ?e, "Error handling client message");
            notify_error(&frame_tx, format!("{e:#}")).await;
        }
    }

    state.registry.teardown(connection_id).await;
    let _ = frame_tx
        .send(Outbound::Close {
            code: close_code::NORMAL,
            reason: "",
        })
        .await;
    drop(frame_tx);
    if let Err(e) = writer.await {
        warn!(error = %e, "Client writer task failed");
    }
    info!("Client connection closed");
}

/// Reads client frames until the client leaves, the upstream session ends, or
/// a message cannot be handled.
async fn run_dispatch_loop(
    socket_rx: &mut SplitStream<WebSocket>,
    link: &Arc<UpstreamLink>,
    frames: &mpsc::Sender<Outbound>,
    state: &AppState,
) -> Result<DispatchExit> {
    let mut pacer = AudioPacer::default();
    let mut throttle = FeedbackThrottle::new(state.timings.feedback_interval);

    let mut upstream_state = link.watch_state();
    let upstream_closed = async move {
        let _ = upstream_state.wait_for(SessionState::is_terminal).await;
    };
    tokio::pin!(upstream_closed);

    loop {
        tokio::select! {
            message = socket_rx.next() => {
                let Some(message) = message else {
                    return Ok(DispatchExit::ClientClosed);
                };
                match message.context("Failed to receive from client")? {
                    Message::Binary(data) => {
                        pacer.append(&data);
                        debug!(
                            buffered = pacer.len(),
                            threshold = pacer.threshold(),
                            "Buffered client audio"
                        );
                        if pacer.should_flush() {
                            let chunk = pacer.flush();
                            link.send_audio_chunk(&chunk)
                                .await
                                .context("Failed to forward audio upstream")?;
                        }
                    }
                    Message::Text(text) => {
                        handle_command(text.as_str(), &mut pacer, &mut throttle, link, frames)
                            .await?;
                    }
                    Message::Close(frame) => {
                        debug!(?frame, "Client sent close frame");
                        return Ok(DispatchExit::ClientClosed);
                    }
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
            _ = &mut upstream_closed => return Ok(DispatchExit::UpstreamClosed),
        }
    }
}

async fn handle_command(
    text: &str,
    pacer: &mut AudioPacer,
    throttle: &mut FeedbackThrottle,
    link: &Arc<UpstreamLink>,
    frames: &mpsc::Sender<Outbound>,
) -> Result<()> {
    let command = match ClientCommand::parse(text) {
        Ok(Some(command)) => command,
        Ok(None) => {
            debug!("Ignoring client message of unknown type");
            return Ok(());
        }
        Err(e) => {
            warn!(error = %e, "Ignoring malformed client message");
            return Ok(());
        }
    };

    match command {
        ClientCommand::CommitAudio => {
            if let Some(rest) = pacer.take_remaining() {
                if rest.len() < MIN_CHUNK_BYTES {
                    debug!(
                        bytes = rest.len(),
                        min = MIN_CHUNK_BYTES,
                        "Flushing audio below the upstream minimum chunk size"
                    );
                }
                link.send_audio_chunk(&rest)
                    .await
                    .context("Failed to flush audio before commit")?;
            }
            link.commit_audio_buffer()
                .await
                .context("Failed to commit audio buffer")?;
        }
        ClientCommand::Configure => {
            info!("Configuration update requested; session settings are fixed at connect");
        }
        ClientCommand::GetFeedback => {
            if throttle.try_acquire(Instant::now()) {
                let snapshot = link.feedback().await;
                info!(grade = ?snapshot.grade, "Sending training feedback");
                frames
                    .send(Outbound::Message(snapshot.into()))
                    .await
                    .context("Client writer has stopped")?;
            } else {
                info!(
                    interval_ms = throttle.interval().as_millis() as u64,
                    "Feedback requested too soon; dropping request"
                );
            }
        }
    }
    Ok(())
}

/// Best-effort error frame ahead of closing.
async fn notify_error(frames: &mpsc::Sender<Outbound>, details: impl Into<String>) {
    let message = ServerMessage::internal_error(details);
    if frames.send(Outbound::Message(message)).await.is_err() {
        debug!("Client writer already stopped; error frame not sent");
    }
}

/// Owns the client sink. Response audio is written as binary frames as soon
/// as it arrives, and queued audio always goes out ahead of queued frames.
async fn run_client_writer(
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut audio_rx: mpsc::Receiver<Bytes>,
    mut frame_rx: mpsc::Receiver<Outbound>,
) {
    loop {
        tokio::select! {
            biased;
            Some(chunk) = audio_rx.recv() => {
                debug!(bytes = chunk.len(), "Sending response audio to client");
                if let Err(e) = socket_tx.send(Message::Binary(chunk)).await {
                    debug!(error = %e, "Client socket closed; stopping writer");
                    break;
                }
            }
            Some(frame) = frame_rx.recv() => match frame {
                Outbound::Message(message) => {
                    if let Err(e) = send_msg(&mut socket_tx, &message).await {
                        debug!(error = %e, "Failed to send message to client");
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: Utf8Bytes::from_static(reason),
                    };
                    if let Err(e) = socket_tx.send(Message::Close(Some(frame))).await {
                        debug!(error = %e, "Client socket already closed");
                    }
                    break;
                }
            },
            else => break,
        }
    }
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
