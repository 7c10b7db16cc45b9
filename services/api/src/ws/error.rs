//! Failure kinds of the upstream connection.

use tokio_tungstenite::tungstenite;

/// Opening the upstream connection failed. Fatal to the session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("OPENAI_API_KEY is not configured")]
    MissingCredentials,
    #[error("could not build upstream request: {0}")]
    InvalidRequest(String),
    #[error("upstream handshake failed: {0}")]
    Handshake(#[from] tungstenite::Error),
}

/// Writing a control message upstream failed. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("upstream is not connected")]
    NotConnected,
    #[error("could not serialize upstream message: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("upstream transport error: {0}")]
    Transport(#[source] tungstenite::Error),
}

/// The upstream connection failed while listening.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("upstream connection lost: {0}")]
    Transport(#[from] tungstenite::Error),
}
