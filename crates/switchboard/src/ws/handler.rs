//! WebSocket handler for relay connections.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::sync::Arc;

use switchboard_protocol::Envelope;

use super::hub::{HubEvent, RelayHub};
use crate::api::AppState;

/// WebSocket upgrade handler.
///
/// GET /ws
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_relay_connection(socket, hub))
}

/// Handle one relay connection from accept to close.
async fn handle_relay_connection(socket: WebSocket, hub: Arc<RelayHub>) {
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, mut frame_rx) = hub.registry().add();
    hub.emit(HubEvent::Connected {
        id: conn_id.clone(),
    });

    // Send the welcome frame carrying the assigned id.
    let connected = match serde_json::to_string(&Envelope::connected(&conn_id)) {
        Ok(json) => json,
        Err(err) => {
            error!("Failed to serialize connected frame for {}: {}", conn_id, err);
            hub.registry().remove(&conn_id);
            return;
        }
    };
    if let Err(err) = sender.send(Message::Text(connected.into())).await {
        error!("Failed to send connected frame to {}: {}", conn_id, err);
        hub.registry().remove(&conn_id);
        return;
    }

    // Writer task: drain the registry channel into the socket. Transport-level
    // FIFO per connection is preserved by funneling all outbound frames
    // through this single task.
    let writer_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                debug!("Writer for {} stopping: socket closed", writer_conn_id);
                break;
            }
        }
    });

    // Read frames until the connection closes or errors.
    while let Some(msg_result) = receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                hub.dispatch(&conn_id, text.as_str()).await;
            }
            Ok(Message::Binary(_)) => {
                debug!("Ignoring binary frame from {}", conn_id);
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Keepalive; axum answers pings itself.
            }
            Ok(Message::Close(_)) => {
                info!("Connection {} closed by peer", conn_id);
                break;
            }
            Err(err) => {
                warn!("WebSocket error for {}: {}", conn_id, err);
                break;
            }
        }
    }

    send_task.abort();
    hub.registry().remove(&conn_id);
    hub.emit(HubEvent::Disconnected {
        id: conn_id.clone(),
    });
    info!("Connection {} cleaned up", conn_id);
}
