//! Pending-request tracking.
//!
//! Each correlated request registers a oneshot completion keyed by its id.
//! Completion is by `DashMap::remove`, so whichever of reply, timeout, or
//! disconnect removes the entry first wins; the losers find nothing and do
//! nothing. Ids come from a monotonically increasing counter and are never
//! reused within the client's lifetime.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use log::debug;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::ClientError;

pub(crate) type Completion = oneshot::Sender<Result<Value, ClientError>>;

pub(crate) struct PendingRequests {
    map: DashMap<String, Completion>,
    next_id: AtomicU64,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Allocate the next request id.
    pub fn next_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("req_{n}")
    }

    /// Register a pending request under `id`.
    pub fn register(&self, id: &str, completion: Completion) {
        self.map.insert(id.to_string(), completion);
    }

    /// Resolve the pending request for `id` with a reply payload.
    ///
    /// Returns false when no entry matches (already resolved, timed out, or
    /// never ours) -- the reply is then silently discarded.
    pub fn complete(&self, id: &str, payload: Value) -> bool {
        match self.map.remove(id) {
            Some((_, completion)) => {
                let _ = completion.send(Ok(payload));
                true
            }
            None => {
                debug!("Discarding result for unknown request id {}", id);
                false
            }
        }
    }

    /// Drop the pending entry for `id` (timeout path). Returns whether an
    /// entry was actually removed.
    pub fn abandon(&self, id: &str) -> bool {
        self.map.remove(id).is_some()
    }

    /// Fail every pending request with [`ClientError::ConnectionClosed`] and
    /// empty the set. Called on disconnect; guarantees nothing is left
    /// unresolved.
    pub fn fail_all(&self) {
        let ids: Vec<String> = self.map.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            if let Some((_, completion)) = self.map.remove(&id) {
                let _ = completion.send(Err(ClientError::ConnectionClosed));
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn ids_are_monotonic_and_unique() {
        let pending = PendingRequests::new();
        assert_eq!(pending.next_id(), "req_1");
        assert_eq!(pending.next_id(), "req_2");
        assert_eq!(pending.next_id(), "req_3");
    }

    #[tokio::test]
    async fn complete_resolves_exactly_once() {
        let pending = PendingRequests::new();
        let (tx, rx) = oneshot::channel();
        pending.register("req_1", tx);

        assert!(pending.complete("req_1", json!({ "found": true })));
        // A late duplicate reply finds no entry.
        assert!(!pending.complete("req_1", json!({ "found": false })));

        let result = rx.await.unwrap().unwrap();
        assert_eq!(result, json!({ "found": true }));
    }

    #[tokio::test]
    async fn abandoned_request_discards_late_reply() {
        let pending = PendingRequests::new();
        let (tx, mut rx) = oneshot::channel();
        pending.register("req_1", tx);

        assert!(pending.abandon("req_1"));
        assert!(!pending.abandon("req_1"));
        assert!(!pending.complete("req_1", json!({})));
        // The receiver sees the sender dropped, nothing else.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn fail_all_rejects_everything_with_closed() {
        let pending = PendingRequests::new();
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        pending.register("req_1", tx_a);
        pending.register("req_2", tx_b);

        pending.fail_all();
        assert_eq!(pending.len(), 0);

        assert!(matches!(
            rx_a.await.unwrap(),
            Err(ClientError::ConnectionClosed)
        ));
        assert!(matches!(
            rx_b.await.unwrap(),
            Err(ClientError::ConnectionClosed)
        ));
    }
}
