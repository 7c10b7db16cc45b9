//! WebSocket Session Management
//!
//! This module bridges browser audio sockets to the upstream realtime API.
//! It is structured into submodules:
//!
//! - `protocol`: the JSON messages exchanged with the browser.
//! - `session`: the per-connection bridge, from handshake to teardown.
//! - `upstream`: the outbound realtime connection.
//! - `registry`: the process-wide table of live connections.
//! - `echo`: a loopback socket for debugging clients.

pub mod echo;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod upstream;

#[cfg(test)]
pub(crate) mod testing;

pub use echo::echo_handler;
pub use session::ws_handler;
