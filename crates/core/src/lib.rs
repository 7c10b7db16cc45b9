//! Transport-free core of the de-escalation coaching relay.
//!
//! Everything here is synchronous and performs no I/O: audio pacing, upstream
//! message types, the event interpreter, grade extraction and per-session
//! state. The `coach-api` service wires these to real sockets.

pub mod audio;
pub mod events;
pub mod feedback;
pub mod interpreter;
pub mod realtime_config;
pub mod session;
pub mod throttle;
