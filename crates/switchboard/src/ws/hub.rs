//! The relay hub: owns the registry, classifies inbound frames, and routes
//! them between roles.

use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::broadcast;

use switchboard_protocol::{Envelope, MessageClass, Role};

use super::registry::{ConnectionId, ConnectionRegistry, ConnectionSummary};

/// Size of the lifecycle-event broadcast channel.
const EVENT_BUFFER_SIZE: usize = 256;

/// Lifecycle events emitted by the hub.
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// A connection was accepted and assigned an id.
    Connected { id: ConnectionId },
    /// A connection announced (or re-announced) its role.
    Identified { id: ConnectionId, role: Role },
    /// A connection closed or errored and was removed.
    Disconnected { id: ConnectionId },
}

/// Relay hub managing all connections and routing frames between roles.
pub struct RelayHub {
    registry: ConnectionRegistry,
    event_tx: broadcast::Sender<HubEvent>,
}

impl RelayHub {
    pub fn new() -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Arc::new(Self {
            registry: ConnectionRegistry::new(),
            event_tx,
        })
    }

    /// The hub's connection registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<HubEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: HubEvent) {
        // Nobody listening is fine.
        let _ = self.event_tx.send(event);
    }

    /// Id and role of every live connection, for the health endpoint.
    pub fn snapshot(&self) -> Vec<ConnectionSummary> {
        self.registry.snapshot()
    }

    /// Dispatch one inbound text frame from connection `sender_id`.
    ///
    /// The raw frame is forwarded verbatim for command and result classes so
    /// payloads and correlation ids pass through untouched. A malformed or
    /// unknown frame is logged and dropped; it never terminates the session.
    pub async fn dispatch(&self, sender_id: &str, raw: &str) {
        let envelope: Envelope = match serde_json::from_str(raw) {
            Ok(env) => env,
            Err(err) => {
                warn!("Dropping malformed frame from {}: {}", sender_id, err);
                return;
            }
        };

        match envelope.classify() {
            MessageClass::Identify => match envelope.identify_role() {
                Some(role) => {
                    if self.registry.set_role(sender_id, role) {
                        self.emit(HubEvent::Identified {
                            id: sender_id.to_string(),
                            role,
                        });
                    }
                }
                None => {
                    warn!(
                        "Dropping identify frame with invalid role from {}",
                        sender_id
                    );
                }
            },
            MessageClass::Command => {
                let delivered = self
                    .registry
                    .broadcast(Role::Target, raw, Some(sender_id))
                    .await;
                debug!(
                    "Forwarded {} from {} to {} target(s)",
                    envelope.kind, sender_id, delivered
                );
            }
            MessageClass::Result => {
                let delivered = self
                    .registry
                    .broadcast(Role::Controller, raw, Some(sender_id))
                    .await;
                debug!(
                    "Forwarded result from {} to {} controller(s)",
                    sender_id, delivered
                );
            }
            MessageClass::Unknown => {
                warn!(
                    "Dropping unknown message type '{}' from {}",
                    envelope.kind, sender_id
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchboard_protocol::TYPE_IDENTIFY;
    use tokio::sync::mpsc;

    struct Peer {
        id: ConnectionId,
        rx: mpsc::Receiver<String>,
    }

    async fn join(hub: &RelayHub, role: Role) -> Peer {
        let (id, rx) = hub.registry().add();
        hub.dispatch(&id, &serde_json::to_string(&Envelope::identify(role)).unwrap())
            .await;
        Peer { id, rx }
    }

    #[tokio::test]
    async fn command_fans_out_to_targets_not_controllers() {
        let hub = RelayHub::new();
        let mut target_a = join(&hub, Role::Target).await;
        let mut target_b = join(&hub, Role::Target).await;
        let mut controller = join(&hub, Role::Controller).await;

        let frame = json!({ "type": "element:query", "payload": { "selector": "#a" }, "id": "req_1" })
            .to_string();
        hub.dispatch(&controller.id, &frame).await;

        assert_eq!(target_a.rx.try_recv().unwrap(), frame);
        assert_eq!(target_b.rx.try_recv().unwrap(), frame);
        assert!(controller.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn command_excludes_sending_target() {
        let hub = RelayHub::new();
        let mut target_a = join(&hub, Role::Target).await;
        let mut target_b = join(&hub, Role::Target).await;

        let frame = json!({ "type": "pointer:move", "payload": { "x": 1, "y": 2 } }).to_string();
        hub.dispatch(&target_a.id, &frame).await;

        assert!(target_a.rx.try_recv().is_err());
        assert_eq!(target_b.rx.try_recv().unwrap(), frame);
    }

    #[tokio::test]
    async fn result_reaches_controllers_with_id_intact() {
        let hub = RelayHub::new();
        let mut controller = join(&hub, Role::Controller).await;
        let mut other_target = join(&hub, Role::Target).await;
        let target = join(&hub, Role::Target).await;

        let frame = json!({ "type": "result", "payload": { "found": true }, "id": "req_42" })
            .to_string();
        hub.dispatch(&target.id, &frame).await;

        // Forwarded verbatim: the controller sees the exact bytes sent.
        assert_eq!(controller.rx.try_recv().unwrap(), frame);
        assert!(other_target.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_are_dropped() {
        let hub = RelayHub::new();
        let mut target = join(&hub, Role::Target).await;
        let controller = join(&hub, Role::Controller).await;

        hub.dispatch(&controller.id, "{not json").await;
        hub.dispatch(&controller.id, &json!({ "type": "file:save" }).to_string())
            .await;

        assert!(target.rx.try_recv().is_err());
        // Both connections survive the bad frames.
        assert_eq!(hub.registry().len(), 2);
    }

    #[tokio::test]
    async fn identify_is_consumed_and_emits_event() {
        let hub = RelayHub::new();
        let mut events = hub.subscribe_events();
        let (id, mut rx) = hub.registry().add();
        let mut other = join(&hub, Role::Target).await;

        hub.dispatch(&id, &json!({ "type": TYPE_IDENTIFY, "payload": { "type": "controller" } }).to_string())
            .await;

        assert_eq!(hub.registry().role_of(&id), Some(Role::Controller));
        // Never forwarded to anyone.
        assert!(rx.try_recv().is_err());
        assert!(other.rx.try_recv().is_err());

        // Skip the Identified event from `join`.
        loop {
            match events.try_recv() {
                Ok(HubEvent::Identified { id: event_id, role }) if event_id == id => {
                    assert_eq!(role, Role::Controller);
                    break;
                }
                Ok(_) => continue,
                Err(err) => panic!("missing Identified event: {err}"),
            }
        }
    }

    #[tokio::test]
    async fn identify_with_invalid_role_is_dropped() {
        let hub = RelayHub::new();
        let (id, _rx) = hub.registry().add();
        hub.dispatch(&id, &json!({ "type": TYPE_IDENTIFY, "payload": { "type": "admin" } }).to_string())
            .await;
        assert_eq!(hub.registry().role_of(&id), Some(Role::Unannounced));
    }
}
