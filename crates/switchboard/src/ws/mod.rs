//! WebSocket relay: connection registry, role router, connection handler.

pub mod handler;
pub mod hub;
pub mod registry;

pub use hub::{HubEvent, RelayHub};
pub use registry::{ConnectionId, ConnectionRegistry, ConnectionSummary};
