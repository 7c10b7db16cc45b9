use coach_core::realtime_config::DEFAULT_REALTIME_MODEL;
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Deployment environment. Changes the advertised WebSocket URL and the
/// welcome page badge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerEnv {
    Dev,
    Prod,
}

impl ServerEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerEnv::Dev => "dev",
            ServerEnv::Prod => "prod",
        }
    }
}

impl FromStr for ServerEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(ServerEnv::Dev),
            "prod" | "production" => Ok(ServerEnv::Prod),
            other => Err(format!("'{other}' is not one of dev, prod")),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub server_env: ServerEnv,
    pub public_host: String,
    pub openai_api_key: Option<String>,
    pub realtime_url: String,
    pub realtime_model: String,
    pub api_base: String,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let server_env = std::env::var("SERVER_ENV")
            .unwrap_or_else(|_| "dev".to_string())
            .parse::<ServerEnv>()
            .map_err(|e| ConfigError::InvalidValue("SERVER_ENV".to_string(), e))?;

        let public_host = std::env::var("HOST").unwrap_or_else(|_| "localhost".to_string());

        // An empty key is treated as absent.
        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let realtime_url = std::env::var("OPENAI_REALTIME_URL")
            .unwrap_or_else(|_| "wss://api.openai.com/v1/realtime".to_string());
        let realtime_model =
            std::env::var("REALTIME_MODEL").unwrap_or_else(|_| DEFAULT_REALTIME_MODEL.to_string());
        let api_base = std::env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            server_env,
            public_host,
            openai_api_key,
            realtime_url,
            realtime_model,
            api_base: api_base.trim_end_matches('/').to_string(),
            log_level,
        })
    }

    /// True when the advertised WebSocket endpoint is served over TLS.
    pub fn uses_secure_websocket(&self) -> bool {
        self.server_env == ServerEnv::Prod && self.public_host.contains("ondigitalocean.app")
    }

    /// The speech WebSocket URL advertised to clients.
    pub fn advertised_ws_url(&self) -> String {
        let port = self.bind_address.port();
        match self.server_env {
            ServerEnv::Prod if self.uses_secure_websocket() => {
                format!("wss://{}/api/ws/speech", self.public_host)
            }
            ServerEnv::Prod => format!("ws://{}:{}/api/ws/speech", self.public_host, port),
            ServerEnv::Dev => format!("ws://localhost:{}/api/ws/speech", port),
        }
    }
}
