//! Client SDK for the switchboard relay.
//!
//! [`RelayClient`] wraps one WebSocket connection to the hub and is used the
//! same way by both sides of the protocol: a controller sends commands and
//! awaits correlated results; a target subscribes to forwarded commands and
//! responds. The client announces its role on every (re)connect, turns
//! fire-and-forget frames into awaitable request/response pairs with
//! deadlines, and fails every pending request the moment the transport drops.
//!
//! ```no_run
//! use switchboard_client::{ClientConfig, RelayClient};
//! use switchboard_protocol::Role;
//!
//! # async fn demo() -> Result<(), switchboard_client::ClientError> {
//! let client = RelayClient::new(ClientConfig::new("ws://127.0.0.1:3001/ws", Role::Controller));
//! client.connect().await?;
//! let info = client.query_selector("#submit").await?;
//! if info.found {
//!     client.click_element("#submit").await?;
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod controller;
mod error;
mod pending;

pub use client::{ConnectionState, RelayClient};
pub use config::{ClientConfig, ReconnectPolicy, DEFAULT_REQUEST_TIMEOUT};
pub use controller::DEFAULT_WAIT_TIMEOUT;
pub use error::ClientError;
