//! Debug socket that echoes client frames without touching the upstream.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info};

pub async fn echo_handler(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(handle_echo)
}

async fn handle_echo(socket: WebSocket) {
    info!("Echo client connected");
    let (mut tx, mut rx) = socket.split();
    while let Some(Ok(message)) = rx.next().await {
        let reply = match message {
            Message::Binary(data) => Message::Binary(data),
            Message::Text(text) => Message::Text(format!("Echo: {}", text.as_str()).into()),
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };
        if let Err(e) = tx.send(reply).await {
            debug!(error = %e, "Echo client went away");
            break;
        }
    }
    info!("Echo client disconnected");
}
