//! Switchboard relay hub.
//!
//! Accepts WebSocket connections, classifies each into a role via the
//! `identify` handshake, and routes frames between roles: command-class
//! frames fan out to `target` connections, `result` frames fan out to
//! `controller` connections. A small HTTP surface exposes a health check.

pub mod api;
pub mod config;
pub mod ws;
