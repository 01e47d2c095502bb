//! Reconnection and disconnect behavior against a scripted relay.
//!
//! These tests stand up a bare tokio-tungstenite acceptor so the server side
//! of each scenario can be driven precisely: close at a chosen moment, stop
//! accepting, or never reply.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use switchboard_client::{ClientConfig, ClientError, ConnectionState, ReconnectPolicy, RelayClient};
use switchboard_protocol::Role;

/// Accept connections forever; for each, record the first text frame and
/// then immediately close, so every accepted connection forces a reconnect.
async fn spawn_close_after_first_frame(
) -> (String, mpsc::UnboundedReceiver<String>, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (first_frame_tx, first_frame_rx) = mpsc::unbounded_channel();
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let tx = first_frame_tx.clone();
            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.unwrap();
                while let Some(Ok(msg)) = ws.next().await {
                    if let Message::Text(text) = msg {
                        let _ = tx.send(text.to_string());
                        break;
                    }
                }
                let _ = ws.close(None).await;
            });
        }
    });

    (url, first_frame_rx, accepted)
}

fn identify_role(frame: &str) -> Option<String> {
    let value: Value = serde_json::from_str(frame).ok()?;
    if value.get("type")?.as_str()? != "identify" {
        return None;
    }
    Some(value.get("payload")?.get("type")?.as_str()?.to_string())
}

#[tokio::test]
async fn identify_is_first_frame_on_every_connection() {
    let (url, mut frames, _accepted) = spawn_close_after_first_frame().await;

    let client = RelayClient::new(
        ClientConfig::new(&url, Role::Target).reconnect_policy(ReconnectPolicy::Fixed {
            delay: Duration::from_millis(50),
        }),
    );
    client.connect().await.unwrap();

    // First connection announces the role before anything else.
    let first = tokio::time::timeout(Duration::from_secs(2), frames.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(identify_role(&first).as_deref(), Some("target"));

    // The server closes after the identify; the client reconnects and the
    // new connection's first frame is again the identify for the same role.
    let second = tokio::time::timeout(Duration::from_secs(2), frames.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(identify_role(&second).as_deref(), Some("target"));

    client.disconnect().await;
}

#[tokio::test]
async fn first_connect_failure_surfaces_to_caller() {
    // Nothing is listening here.
    let client = RelayClient::new(ClientConfig::new(
        "ws://127.0.0.1:9",
        Role::Controller,
    ));
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn send_while_disconnected_fails_immediately() {
    let client = RelayClient::new(ClientConfig::default());
    let err = client
        .send("pointer:move", serde_json::json!({ "x": 0, "y": 0 }))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotConnected));
}

#[tokio::test]
async fn pending_requests_reject_closed_when_transport_drops() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    // Accept one connection, swallow the identify and the request, then
    // drop the socket without replying.
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let mut seen = 0;
        while let Some(Ok(msg)) = ws.next().await {
            if matches!(msg, Message::Text(_)) {
                seen += 1;
                if seen == 2 {
                    break;
                }
            }
        }
        drop(ws);
    });

    let client = RelayClient::new(ClientConfig::new(&url, Role::Controller).auto_reconnect(false));
    client.connect().await.unwrap();

    // Deadline far beyond the test horizon: the rejection must come from the
    // disconnect, not the timer.
    let err = client
        .request_with_timeout(
            "element:query",
            serde_json::json!({ "selector": "#a" }),
            Duration::from_secs(30),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed));
}

#[tokio::test]
async fn bounded_policy_stops_after_max_attempts() {
    // Accept exactly one connection, read its identify, close the socket,
    // and stop listening entirely so every reconnect attempt is refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _ = ws.next().await;
        let _ = ws.close(None).await;
        // Listener dropped here; the port stops accepting.
    });

    let client = RelayClient::new(ClientConfig::new(&url, Role::Target).reconnect_policy(
        ReconnectPolicy::Linear {
            base: Duration::from_millis(20),
            max_attempts: 2,
        },
    ));
    client.connect().await.unwrap();

    // Both reconnect attempts (20ms + 40ms delays) fail against the closed
    // port; after exhaustion the client stays disconnected with no further
    // errors surfaced.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // Exhaustion does not poison the client: an explicit connect runs a
    // fresh first attempt, and its failure surfaces to this caller.
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
}

#[tokio::test]
async fn explicit_disconnect_wins_over_inflight_reconnect_attempt() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        // First connection: read the identify, then close to force a
        // reconnect.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _ = ws.next().await;
        let _ = ws.close(None).await;

        // Second connection: accept the TCP stream but stall the WebSocket
        // handshake, keeping the reconnect attempt in flight.
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        if let Ok(mut ws) = accept_async(stream).await {
            let _ = ws.next().await;
        }
    });

    let client = RelayClient::new(
        ClientConfig::new(&url, Role::Target).reconnect_policy(ReconnectPolicy::Fixed {
            delay: Duration::from_millis(50),
        }),
    );
    client.connect().await.unwrap();

    // Disconnect while the reconnect handshake is stalled mid-flight.
    tokio::time::sleep(Duration::from_millis(150)).await;
    client.disconnect().await;

    // Even after the stalled handshake window passes, the client must not
    // come back up.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn identify_precedes_frames_from_concurrent_senders() {
    let (url, mut frames, _accepted) = spawn_close_after_first_frame().await;

    let client = RelayClient::new(
        ClientConfig::new(&url, Role::Target).reconnect_policy(ReconnectPolicy::Fixed {
            delay: Duration::from_millis(30),
        }),
    );
    client.connect().await.unwrap();

    // Hammer the send path while the server forces reconnect cycles;
    // failures while disconnected are expected and ignored.
    let sender = client.clone();
    let hammer = tokio::spawn(async move {
        loop {
            let _ = sender
                .send("pointer:move", serde_json::json!({ "x": 1, "y": 2 }))
                .await;
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });

    // The first frame of every connection is still the identify.
    for _ in 0..3 {
        let first = tokio::time::timeout(Duration::from_secs(2), frames.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identify_role(&first).as_deref(), Some("target"));
    }

    hammer.abort();
    client.disconnect().await;
}

#[tokio::test]
async fn concurrent_connect_calls_share_one_transport() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.unwrap();
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });

    let client = RelayClient::new(ClientConfig::new(&url, Role::Controller).auto_reconnect(false));
    let (a, b) = tokio::join!(client.connect(), client.connect());
    a.unwrap();
    b.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(client.is_connected());
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn explicit_disconnect_cancels_scheduled_reconnect() {
    let (url, mut frames, accepted) = spawn_close_after_first_frame().await;

    let client = RelayClient::new(
        ClientConfig::new(&url, Role::Controller).reconnect_policy(ReconnectPolicy::Fixed {
            delay: Duration::from_millis(100),
        }),
    );
    client.connect().await.unwrap();
    let _ = frames.recv().await;

    // The server closes right after the identify; a reconnect is now
    // scheduled. Disconnecting must cancel that timer before it fires.
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.disconnect().await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}
