//! Client error types.

use thiserror::Error;

/// Errors surfaced by the relay client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// `send`/`request` was called while the transport is not open. The
    /// client never queues frames for later delivery.
    #[error("not connected to relay")]
    NotConnected,

    /// No matching result arrived within the deadline. Only the one pending
    /// request is affected.
    #[error("request timeout: {kind}")]
    Timeout { kind: String },

    /// The transport closed while the request was pending. Distinct from
    /// [`ClientError::Timeout`]: every pending request of the client fails
    /// with this at once.
    #[error("connection closed")]
    ConnectionClosed,

    /// Transport-level failure. Surfaced to the caller only on the very
    /// first connect attempt; later transport errors drive the reconnection
    /// state machine instead.
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// A frame failed to serialize or a reply payload failed to parse.
    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    /// An element operation could not locate its element.
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// The automation surface reported a script failure.
    #[error("script execution failed: {0}")]
    Script(String),
}
