//! Connection registry: the single owner of all live connection records.
//!
//! Accept, dispatch, and disconnect run concurrently across connections, so
//! the registry is backed by a [`DashMap`]. Broadcast collects the matching
//! senders before awaiting any of them, so iteration never holds a shard
//! lock across a send.

use dashmap::DashMap;
use log::{debug, info, warn};
use tokio::sync::mpsc;

use switchboard_protocol::Role;

/// Size of the per-connection outbound buffer.
const CONNECTION_BUFFER_SIZE: usize = 64;

/// Length of the generated connection ids.
const CONNECTION_ID_LEN: usize = 8;

/// Opaque connection identifier, assigned at accept time.
pub type ConnectionId = String;

/// Outbound channel for one connection; carries raw JSON frames.
pub type FrameSender = mpsc::Sender<String>;

struct ConnectionEntry {
    role: Role,
    tx: FrameSender,
}

/// Id and role of a live connection, for the health endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConnectionSummary {
    pub id: ConnectionId,
    pub role: Role,
}

/// Tracks live connections and their assigned roles.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a new connection with role [`Role::Unannounced`].
    ///
    /// Returns the assigned id and the receiver end of the connection's
    /// outbound channel; the caller's writer task drains it.
    pub fn add(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = nanoid::nanoid!(CONNECTION_ID_LEN);
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER_SIZE);
        self.connections.insert(
            id.clone(),
            ConnectionEntry {
                role: Role::Unannounced,
                tx,
            },
        );
        info!("Registered connection {}", id);
        (id, rx)
    }

    /// Remove a connection. Idempotent: close and error may both report the
    /// same connection, and only the first removal has effect.
    pub fn remove(&self, id: &str) {
        if self.connections.remove(id).is_some() {
            info!("Removed connection {}", id);
        } else {
            debug!("Connection {} already removed", id);
        }
    }

    /// Record the announced role for a connection.
    ///
    /// Returns false if the connection is no longer registered (it may have
    /// closed between dispatch and this call).
    pub fn set_role(&self, id: &str, role: Role) -> bool {
        match self.connections.get_mut(id) {
            Some(mut entry) => {
                entry.role = role;
                info!("Connection {} identified as {}", id, role);
                true
            }
            None => {
                debug!("set_role for unknown connection {}", id);
                false
            }
        }
    }

    /// The recorded role of a connection, if it is still registered.
    pub fn role_of(&self, id: &str) -> Option<Role> {
        self.connections.get(id).map(|entry| entry.role)
    }

    /// Send a raw frame to every connection with `role`, excluding
    /// `exclude_id`. Returns the number of connections the frame was
    /// queued for.
    pub async fn broadcast(&self, role: Role, frame: &str, exclude_id: Option<&str>) -> usize {
        // Snapshot the matching senders first; sending awaits and must not
        // hold any registry shard lock.
        let recipients: Vec<(ConnectionId, FrameSender)> = self
            .connections
            .iter()
            .filter(|entry| entry.value().role == role && Some(entry.key().as_str()) != exclude_id)
            .map(|entry| (entry.key().clone(), entry.value().tx.clone()))
            .collect();

        let mut delivered = 0;
        for (id, tx) in recipients {
            if tx.send(frame.to_string()).await.is_err() {
                warn!("Failed to queue frame for connection {}", id);
            } else {
                delivered += 1;
            }
        }
        delivered
    }

    /// Id and role of every live connection.
    pub fn snapshot(&self) -> Vec<ConnectionSummary> {
        self.connections
            .iter()
            .map(|entry| ConnectionSummary {
                id: entry.key().clone(),
                role: entry.value().role,
            })
            .collect()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
