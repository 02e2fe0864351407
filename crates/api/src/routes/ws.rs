//! Live notification WebSocket.
//!
//! On upgrade the connection is registered under the authenticated user; a
//! forward task drains the connection's channel onto the wire while the read
//! loop waits for client input or disconnection. Either path ends with the
//! user unregistered.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// Outbound buffer per connection; a client this far behind loses pushes.
const CONNECTION_BUFFER: usize = 32;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/notifications/ws", get(ws_handler))
}

/// GET /api/v1/notifications/ws — Upgrade to a live notification stream.
async fn ws_handler(
    ws: WebSocketUpgrade,
    auth: AuthUser,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, auth.user_id, state))
}

async fn handle_socket(socket: WebSocket, user_id: Uuid, state: AppState) {
    tracing::info!(user_id = %user_id, "Live connection opened");

    let (tx, mut rx) = mpsc::channel::<serde_json::Value>(CONNECTION_BUFFER);
    state.registry.register(user_id, tx);

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Forward pushed payloads from the registry channel to the wire.
    let send_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&payload) else {
                continue;
            };
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Read loop: the client sends nothing meaningful, but a read error or
    // close frame is how we learn the connection is gone.
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    state.registry.unregister(user_id);
    send_task.abort();
    tracing::info!(user_id = %user_id, "Live connection closed");
}
