//! Wire protocol for the switchboard relay.
//!
//! Every frame on the wire is a JSON [`Envelope`] with a string `type`, an
//! opaque `payload`, and an optional correlation `id`. The relay only ever
//! inspects the `type` (and, for `identify`, the declared role); payloads are
//! forwarded verbatim between controllers and targets.

mod envelope;
mod payloads;

pub use envelope::{Envelope, MessageClass, Role, COMMAND_TYPES, TYPE_CONNECTED, TYPE_IDENTIFY, TYPE_RESULT};
pub use payloads::{
    BoundingBox, ConnectedPayload, ElementInfo, ElementQuery, IdentifyPayload, MouseButton,
    PointerClick, PointerHover, PointerMove, ScriptExecute, ScriptResult,
};
