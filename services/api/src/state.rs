//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources: configuration, the connection registry and the
//! outbound HTTP client.

use crate::{config::Config, ws::registry::ConnectionRegistry};
use std::{sync::Arc, time::Duration};

/// Timers that govern one bridged session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionTimings {
    /// Delay before configuration is sent if the upstream never announces a session.
    pub config_fallback: Duration,
    /// How long a response cycle may stay pending without a completion event.
    pub response_timeout: Duration,
    /// Minimum spacing between answered `get_feedback` requests.
    pub feedback_interval: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            config_fallback: Duration::from_secs(2),
            response_timeout: Duration::from_secs(10),
            feedback_interval: Duration::from_secs(2),
        }
    }
}

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ConnectionRegistry>,
    pub http: reqwest::Client,
    pub timings: SessionTimings,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(ConnectionRegistry::new()),
            http: reqwest::Client::new(),
            timings: SessionTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: SessionTimings) -> Self {
        self.timings = timings;
        self
    }
}
