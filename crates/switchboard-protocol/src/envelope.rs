//! The wire envelope and message classification.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle message: a client announcing its role. Consumed by the hub,
/// never forwarded.
pub const TYPE_IDENTIFY: &str = "identify";

/// Hub -> client on accept, carrying the assigned connection id.
pub const TYPE_CONNECTED: &str = "connected";

/// Reply message, forwarded controller-ward with its correlation id intact.
pub const TYPE_RESULT: &str = "result";

/// Command-class message types, forwarded target-ward. Anything outside this
/// set (and the lifecycle types above) is unknown and dropped by the hub.
pub const COMMAND_TYPES: &[&str] = &[
    "pointer:move",
    "pointer:click",
    "pointer:hover",
    "element:query",
    "js:execute",
];

/// The role a connection plays in the relay.
///
/// Every connection starts [`Role::Unannounced`]; the first `identify` frame
/// sets it. A later `identify` overwrites it -- the protocol has no
/// prevention, and routing simply follows the most recent announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Unannounced,
    /// The automation surface: receives commands, sends results.
    Target,
    /// The automation driver: sends commands, receives results.
    Controller,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unannounced => write!(f, "unannounced"),
            Self::Target => write!(f, "target"),
            Self::Controller => write!(f, "controller"),
        }
    }
}

/// How the hub treats an inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    /// Role announcement; consumed by the hub.
    Identify,
    /// Forwarded to every `target` connection except the sender.
    Command,
    /// Forwarded to every `controller` connection except the sender.
    Result,
    /// Logged and dropped.
    Unknown,
}

/// The wire-level message envelope: `{type, payload, id?}`.
///
/// `id` is present only on requests expecting a correlated reply and on the
/// replies themselves; it is skipped entirely when absent so that frames
/// without correlation carry no `id` key at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type identifier.
    #[serde(rename = "type")]
    pub kind: String,

    /// Opaque payload, forwarded without interpretation.
    #[serde(default)]
    pub payload: Value,

    /// Correlation id for request/response pairs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Envelope {
    /// Build an envelope without a correlation id.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            id: None,
        }
    }

    /// Build an envelope carrying a correlation id.
    pub fn with_id(kind: impl Into<String>, payload: Value, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload,
            id: Some(id.into()),
        }
    }

    /// The `identify` frame announcing `role`.
    pub fn identify(role: Role) -> Self {
        Self::new(TYPE_IDENTIFY, serde_json::json!({ "type": role }))
    }

    /// The `connected` frame the hub sends on accept.
    pub fn connected(client_id: &str) -> Self {
        Self::new(TYPE_CONNECTED, serde_json::json!({ "clientId": client_id }))
    }

    /// A `result` frame echoing the originating request id.
    pub fn result(payload: Value, id: impl Into<String>) -> Self {
        Self::with_id(TYPE_RESULT, payload, id)
    }

    /// Classify this envelope for routing.
    pub fn classify(&self) -> MessageClass {
        if self.kind == TYPE_IDENTIFY {
            MessageClass::Identify
        } else if self.kind == TYPE_RESULT {
            MessageClass::Result
        } else if COMMAND_TYPES.contains(&self.kind.as_str()) {
            MessageClass::Command
        } else {
            MessageClass::Unknown
        }
    }

    /// The declared role of an `identify` envelope, if parsable.
    pub fn identify_role(&self) -> Option<Role> {
        if self.kind != TYPE_IDENTIFY {
            return None;
        }
        self.payload
            .get("type")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_without_id_omits_field() {
        let env = Envelope::new("pointer:move", serde_json::json!({ "x": 1, "y": 2 }));
        let json = serde_json::to_string(&env).unwrap();
        assert!(!json.contains("\"id\""));
    }

    #[test]
    fn envelope_id_round_trips() {
        let env = Envelope::result(serde_json::json!({ "found": true }), "req_7");
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id.as_deref(), Some("req_7"));
        assert_eq!(back.kind, "result");
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Target).unwrap(), "\"target\"");
        assert_eq!(
            serde_json::to_string(&Role::Controller).unwrap(),
            "\"controller\""
        );
        assert_eq!(
            serde_json::to_string(&Role::Unannounced).unwrap(),
            "\"unannounced\""
        );
    }

    #[test]
    fn classification_covers_all_command_types() {
        for kind in COMMAND_TYPES {
            let env = Envelope::new(*kind, Value::Null);
            assert_eq!(env.classify(), MessageClass::Command, "{kind}");
        }
        assert_eq!(
            Envelope::identify(Role::Target).classify(),
            MessageClass::Identify
        );
        assert_eq!(
            Envelope::result(Value::Null, "req_1").classify(),
            MessageClass::Result
        );
        assert_eq!(
            Envelope::new("file:save", Value::Null).classify(),
            MessageClass::Unknown
        );
    }

    #[test]
    fn identify_role_parses_declared_role() {
        let env = Envelope::identify(Role::Controller);
        assert_eq!(env.identify_role(), Some(Role::Controller));

        let bogus = Envelope::new(TYPE_IDENTIFY, serde_json::json!({ "type": "admin" }));
        assert_eq!(bogus.identify_role(), None);

        let not_identify = Envelope::new("result", serde_json::json!({ "type": "target" }));
        assert_eq!(not_identify.identify_role(), None);
    }

    #[test]
    fn payload_defaults_to_null_when_missing() {
        let env: Envelope = serde_json::from_str("{\"type\":\"connected\"}").unwrap();
        assert_eq!(env.payload, Value::Null);
        assert!(env.id.is_none());
    }
}
