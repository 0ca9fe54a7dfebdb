//! WebSocket handler for the owner's live event stream
//!
//! Each connection is registered with the [`BroadcastHub`](crate::broadcast::BroadcastHub)
//! under the authenticated owner and receives `{"type": ..., "data": ...}`
//! envelopes. Nothing is replayed: a reconnecting client starts from a fresh
//! `system_status` and re-fetches state over REST.

use axum::{
    Extension,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use tracing::{debug, info};

use crate::{api::state::ApiState, broadcast::ClientEvent, identity::Caller};

/// WebSocket upgrade handler
///
/// GET /api/v1/stream
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
) -> Response {
    ws.on_upgrade(|socket| handle_websocket(socket, state, caller))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: ApiState, caller: Caller) {
    let owner = caller.owner;
    let mut subscription = state.hub.register(&owner);
    let connection = subscription.id;
    info!(%owner, connection, "WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();

    let welcome = ClientEvent::SystemStatus(state.monitors.system_status().await);
    if let Ok(text) = serde_json::to_string(&welcome)
        && sender.send(Message::Text(text)).await.is_err()
    {
        state.hub.unregister(&owner, connection);
        debug!("WebSocket send failed, client disconnected");
        return;
    }

    // Forward hub events; ends when the hub drops the connection (overflow)
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            let Ok(text) = serde_json::to_string(&*event) else {
                continue;
            };
            if sender.send(Message::Text(text)).await.is_err() {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
    });

    // Clients only send close/ping frames
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    state.hub.unregister(&owner, connection);
    info!(%owner, connection, "WebSocket client disconnected");
}
