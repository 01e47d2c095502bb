//! The relay client: connection lifecycle, correlated requests, reconnection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use switchboard_protocol::{ConnectedPayload, Envelope, TYPE_CONNECTED, TYPE_RESULT};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::pending::PendingRequests;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Buffer for frames forwarded to [`RelayClient::subscribe`] receivers.
const INCOMING_BUFFER_SIZE: usize = 256;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// A client connection to the relay hub.
///
/// Cloneable handle; all clones share the same connection, pending-request
/// set, and reconnection state.
#[derive(Clone)]
pub struct RelayClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    writer: Mutex<Option<WsSink>>,
    pending: PendingRequests,
    state: StdMutex<ConnectionState>,
    /// Incremented per established connection; a reader task whose epoch is
    /// stale must not touch the state of its successor.
    epoch: AtomicU64,
    attempts: AtomicU32,
    auto_reconnect: AtomicBool,
    /// Owns the scheduled reconnect timer; explicit disconnect cancels it
    /// before anything else so a manual disconnect never races the timer.
    shutdown: StdMutex<CancellationToken>,
    incoming_tx: broadcast::Sender<Envelope>,
    client_id: StdMutex<Option<String>>,
}

impl RelayClient {
    pub fn new(config: ClientConfig) -> Self {
        let (incoming_tx, _) = broadcast::channel(INCOMING_BUFFER_SIZE);
        Self {
            inner: Arc::new(Inner {
                config,
                writer: Mutex::new(None),
                pending: PendingRequests::new(),
                state: StdMutex::new(ConnectionState::Disconnected),
                epoch: AtomicU64::new(0),
                attempts: AtomicU32::new(0),
                auto_reconnect: AtomicBool::new(false),
                shutdown: StdMutex::new(CancellationToken::new()),
                incoming_tx,
                client_id: StdMutex::new(None),
            }),
        }
    }

    /// Connect to the relay and announce this client's role.
    ///
    /// Transport errors propagate from this call only; once connected, later
    /// failures drive the reconnection state machine instead. Calling
    /// `connect` again after an exhausted retry policy re-arms reconnection.
    /// Idempotent: a live or in-progress connection is left alone.
    pub async fn connect(&self) -> Result<(), ClientError> {
        {
            // Claim Connecting under the lock so concurrent connect() calls
            // cannot both open a transport.
            let mut state = self.inner.state.lock().unwrap();
            match *state {
                ConnectionState::Connected | ConnectionState::Connecting => return Ok(()),
                ConnectionState::Disconnected => *state = ConnectionState::Connecting,
            }
        }

        // Fresh token: a previous disconnect() must not suppress this
        // connection's reconnect timers.
        *self.inner.shutdown.lock().unwrap() = CancellationToken::new();
        self.inner
            .auto_reconnect
            .store(self.inner.config.auto_reconnect, Ordering::SeqCst);
        self.inner.attempts.store(0, Ordering::SeqCst);

        Inner::establish(&self.inner).await
    }

    /// Disconnect and disable automatic reconnection.
    ///
    /// Any scheduled reconnect timer is cancelled first; every pending
    /// request is failed with [`ClientError::ConnectionClosed`].
    pub async fn disconnect(&self) {
        self.inner.auto_reconnect.store(false, Ordering::SeqCst);
        self.inner.shutdown.lock().unwrap().cancel();

        let mut writer = self.inner.writer.lock().await;
        if let Some(mut sink) = writer.take() {
            let _ = sink.send(Message::Close(None)).await;
        }
        drop(writer);

        self.inner.set_state(ConnectionState::Disconnected);
        self.inner.pending.fail_all();
        info!("Disconnected from relay");
    }

    /// Fire-and-forget: write the frame immediately.
    ///
    /// Fails with [`ClientError::NotConnected`] if the transport is not
    /// open; frames are never queued.
    pub async fn send(&self, kind: impl Into<String>, payload: Value) -> Result<(), ClientError> {
        self.inner
            .write_frame(&Envelope::new(kind, payload))
            .await
    }

    /// Send a request and await its correlated `result` with the configured
    /// default deadline.
    pub async fn request(
        &self,
        kind: impl Into<String>,
        payload: Value,
    ) -> Result<Value, ClientError> {
        self.request_with_timeout(kind, payload, self.inner.config.request_timeout)
            .await
    }

    /// Send a request and await its correlated `result`.
    ///
    /// Resolves with the payload of the matching result, or fails with
    /// [`ClientError::Timeout`] once the deadline elapses -- removing the
    /// pending entry so a late reply is discarded unmatched.
    pub async fn request_with_timeout(
        &self,
        kind: impl Into<String>,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        let kind = kind.into();
        let id = self.inner.pending.next_id();
        let (tx, rx) = oneshot::channel();
        self.inner.pending.register(&id, tx);

        let envelope = Envelope::with_id(kind.clone(), payload, id.clone());
        if let Err(err) = self.inner.write_frame(&envelope).await {
            self.inner.pending.abandon(&id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            // Completion sender dropped without firing; treat as closed.
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                self.inner.pending.abandon(&id);
                Err(ClientError::Timeout { kind })
            }
        }
    }

    /// Target-side reply: send a `result` frame echoing `request_id`.
    pub async fn respond(&self, request_id: &str, payload: Value) -> Result<(), ClientError> {
        self.inner
            .write_frame(&Envelope::result(payload, request_id))
            .await
    }

    /// Subscribe to frames that are not correlated results -- on a target,
    /// the forwarded command stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.inner.incoming_tx.subscribe()
    }

    /// The hub-assigned connection id, once the welcome frame has arrived.
    pub fn client_id(&self) -> Option<String> {
        self.inner.client_id.lock().unwrap().clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock().unwrap()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
    }

    async fn write_frame(&self, envelope: &Envelope) -> Result<(), ClientError> {
        let json = serde_json::to_string(envelope)?;
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(sink) => {
                sink.send(Message::Text(json.into())).await?;
                Ok(())
            }
            None => Err(ClientError::NotConnected),
        }
    }

    /// Open the transport, announce the role, and start the reader task.
    async fn establish(inner: &Arc<Inner>) -> Result<(), ClientError> {
        inner.set_state(ConnectionState::Connecting);

        let (stream, _response) = match connect_async(inner.config.url.as_str()).await {
            Ok(ok) => ok,
            Err(err) => {
                inner.set_state(ConnectionState::Disconnected);
                return Err(ClientError::Transport(err));
            }
        };

        let (mut sink, source) = stream.split();

        // Identify goes onto the wire before the sink becomes visible to
        // senders, so it is the first frame of every connection no matter
        // who else is writing concurrently.
        let identify = match serde_json::to_string(&Envelope::identify(inner.config.role)) {
            Ok(json) => json,
            Err(err) => {
                inner.set_state(ConnectionState::Disconnected);
                return Err(ClientError::Protocol(err));
            }
        };
        if let Err(err) = sink.send(Message::Text(identify.into())).await {
            inner.set_state(ConnectionState::Disconnected);
            return Err(ClientError::Transport(err));
        }

        let epoch = inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *inner.writer.lock().await = Some(sink);
        inner.set_state(ConnectionState::Connected);
        inner.attempts.store(0, Ordering::SeqCst);
        info!(
            "Connected to relay at {} as {}",
            inner.config.url, inner.config.role
        );

        let reader_inner = inner.clone();
        tokio::spawn(async move {
            Inner::read_loop(reader_inner, source, epoch).await;
        });

        Ok(())
    }

    async fn read_loop(inner: Arc<Inner>, mut source: WsSource, epoch: u64) {
        while let Some(msg) = source.next().await {
            match msg {
                Ok(Message::Text(text)) => inner.handle_frame(text.as_str()),
                Ok(Message::Close(_)) => {
                    debug!("Relay closed the connection");
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("Transport error: {}", err);
                    break;
                }
            }
        }
        Inner::handle_disconnect(&inner, epoch).await;
    }

    fn handle_frame(&self, raw: &str) {
        let envelope: Envelope = match serde_json::from_str(raw) {
            Ok(env) => env,
            Err(err) => {
                warn!("Dropping malformed frame: {}", err);
                return;
            }
        };

        if envelope.kind == TYPE_RESULT {
            match envelope.id {
                Some(id) => {
                    self.pending.complete(&id, envelope.payload);
                }
                None => debug!("Ignoring result frame without id"),
            }
            return;
        }

        if envelope.kind == TYPE_CONNECTED {
            if let Ok(payload) =
                serde_json::from_value::<ConnectedPayload>(envelope.payload.clone())
            {
                debug!("Relay assigned client id {}", payload.client_id);
                *self.client_id.lock().unwrap() = Some(payload.client_id);
            }
            return;
        }

        // Everything else (forwarded commands, broadcasts) goes to
        // subscribers; nobody listening is fine.
        let _ = self.incoming_tx.send(envelope);
    }

    /// Transition to disconnected and, if enabled, schedule reconnection.
    async fn handle_disconnect(inner: &Arc<Inner>, epoch: u64) {
        // A newer connection is already up; this reader is stale.
        if inner.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }

        inner.set_state(ConnectionState::Disconnected);
        *inner.writer.lock().await = None;
        inner.pending.fail_all();

        if inner.auto_reconnect.load(Ordering::SeqCst) {
            Inner::spawn_reconnect(inner.clone());
        }
    }

    fn spawn_reconnect(inner: Arc<Inner>) {
        let token = inner.shutdown.lock().unwrap().clone();
        tokio::spawn(async move {
            loop {
                let attempt = inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                let delay = match inner.config.reconnect.delay_for(attempt) {
                    Some(delay) => delay,
                    None => {
                        info!(
                            "Reconnect attempts exhausted after {} tries; staying disconnected",
                            attempt - 1
                        );
                        return;
                    }
                };

                info!("Reconnecting in {:?} (attempt {})", delay, attempt);
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                if !inner.auto_reconnect.load(Ordering::SeqCst) {
                    return;
                }

                // The token also covers the attempt itself: a handshake can
                // be in flight for seconds, and an explicit disconnect()
                // issued meanwhile must still win.
                let result = tokio::select! {
                    _ = token.cancelled() => {
                        Inner::teardown(&inner).await;
                        return;
                    }
                    result = Inner::establish(&inner) => result,
                };
                match result {
                    Ok(()) => {
                        if token.is_cancelled() {
                            Inner::teardown(&inner).await;
                        }
                        return;
                    }
                    Err(err) => {
                        // Not surfaced to any caller; log and go around.
                        warn!("Reconnect attempt {} failed: {}", attempt, err);
                    }
                }
            }
        });
    }

    /// Dismantle whatever a cancelled reconnect attempt built.
    async fn teardown(inner: &Arc<Inner>) {
        if let Some(mut sink) = inner.writer.lock().await.take() {
            let _ = sink.send(Message::Close(None)).await;
        }
        inner.set_state(ConnectionState::Disconnected);
    }
}
