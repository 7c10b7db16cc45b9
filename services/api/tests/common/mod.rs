//! Shared fixtures: the app on an ephemeral port and a scripted upstream.

#![allow(dead_code)]

use coach_api::{
    config::{Config, ServerEnv},
    router::create_router,
    state::{AppState, SessionTimings},
};
use coach_core::realtime_config::DEFAULT_REALTIME_MODEL;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, accept_async, connect_async, tungstenite::Message,
};
use tracing::Level;

pub type ClientSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub const WAIT: Duration = Duration::from_secs(3);

pub struct TestApp {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
}

impl TestApp {
    pub async fn spawn(config: Config, timings: SessionTimings) -> Self {
        let state = Arc::new(AppState::new(config).with_timings(timings));
        let app = create_router(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn connect_speech(&self, query: &str) -> ClientSocket {
        let url = format!("ws://{}/api/ws/speech{}", self.addr, query);
        let (socket, _) = connect_async(url).await.unwrap();
        socket
    }

    /// Polls the registry until it holds `expected` connections.
    pub async fn wait_for_connections(&self, expected: usize) {
        tokio::time::timeout(WAIT, async {
            while self.state.registry.len().await != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("registry never reached {expected} connections"));
    }
}

pub fn test_config(realtime_url: &str, api_key: Option<&str>) -> Config {
    Config {
        bind_address: "127.0.0.1:8000".parse().unwrap(),
        server_env: ServerEnv::Dev,
        public_host: "localhost".to_string(),
        openai_api_key: api_key.map(str::to_string),
        realtime_url: realtime_url.to_string(),
        realtime_model: DEFAULT_REALTIME_MODEL.to_string(),
        api_base: "http://127.0.0.1:9/v1".to_string(),
        log_level: Level::INFO,
    }
}

/// Timings that keep the configuration fallback out of the way.
pub fn quiet_timings() -> SessionTimings {
    SessionTimings {
        config_fallback: Duration::from_secs(30),
        ..SessionTimings::default()
    }
}

/// A single-connection stand-in for the realtime API. Every JSON message it
/// receives is forwarded on `received`; anything pushed on `outgoing` is sent
/// to the connected app.
pub struct MockUpstream {
    pub url: String,
    pub received: mpsc::UnboundedReceiver<Value>,
    pub outgoing: mpsc::UnboundedSender<Message>,
}

impl MockUpstream {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else { return };
            let Ok(socket) = accept_async(stream).await else { return };
            let (mut tx, mut rx) = socket.split();
            loop {
                tokio::select! {
                    message = rx.next() => match message {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                                let _ = received_tx.send(value);
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                    Some(message) = outgoing_rx.recv() => {
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            url: format!("ws://{addr}/v1/realtime"),
            received,
            outgoing,
        }
    }

    pub fn send_event(&self, event: Value) {
        self.outgoing
            .send(Message::Text(event.to_string().into()))
            .unwrap();
    }

    /// Waits for the next received message of the given type, skipping others.
    pub async fn expect(&mut self, event_type: &str) -> Value {
        tokio::time::timeout(WAIT, async {
            loop {
                let value = self.received.recv().await.expect("upstream closed");
                if value["type"] == event_type {
                    return value;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("upstream never received {event_type}"))
    }

    /// Everything received during `window`.
    pub async fn drain_for(&mut self, window: Duration) -> Vec<Value> {
        let mut values = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(value)) =
            tokio::time::timeout_at(deadline, self.received.recv()).await
        {
            values.push(value);
        }
        values
    }
}

/// Next data or close frame from the server, skipping pings and pongs.
pub async fn next_frame(socket: &mut ClientSocket, within: Duration) -> Option<Message> {
    tokio::time::timeout(within, async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(message)) => return Some(message),
                _ => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

pub async fn send_json(socket: &mut ClientSocket, value: Value) {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}
