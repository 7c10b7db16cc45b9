//! De-escalation Coach API Library Crate
//!
//! This library contains the web service around `coach-core`: configuration,
//! shared state, the HTTP handlers, token minting, the WebSocket bridge to the
//! realtime API and routing. The `api` binary is a thin wrapper around it.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod token;
pub mod ws;
