//! `GET /ws` upgrade handler: a `tokio::select!` loop that forwards
//! broadcast-hub events to the client, reads client frames, and enforces
//! the payload cap, all from one task per connection.
//!
//! `chat`/`voice` client frames are acknowledged but never processed here —
//! the dialogue/voice services are external collaborators this core
//! doesn't implement.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use cw_core::config::MAX_WS_PAYLOAD_BYTES;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_connection(socket, state))
}

#[derive(Deserialize)]
struct ClientFrame {
    #[serde(rename = "type")]
    kind: String,
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = Uuid::new_v4().to_string();
    state.ws_clients.insert(conn_id.clone(), ());
    info!(conn_id = %conn_id, "new WS connection");

    let (mut tx, mut rx) = socket.split();
    let mut broadcast_rx = state.broadcast.subscribe();

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let text_ref: &str = &text;
                        if text_ref.len() > MAX_WS_PAYLOAD_BYTES {
                            warn!(conn_id = %conn_id, size = text_ref.len(), "oversized WS frame, closing");
                            break;
                        }
                        if !handle_client_frame(&conn_id, text_ref, &mut tx).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if tx.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(conn_id = %conn_id, error = %e, "WS read error, closing");
                        break;
                    }
                    _ => {}
                }
            }
            event = cw_broadcast::recv_or_log_lag(&mut broadcast_rx) => {
                match event {
                    Some(event) => {
                        let seq = state.next_seq();
                        let frame = json!({ "type": "event", "seq": seq, "data": event });
                        let payload = serde_json::to_string(&frame).unwrap_or_default();
                        if tx.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.ws_clients.remove(&conn_id);
    info!(conn_id = %conn_id, "WS connection closed");
}

/// Returns `false` when the connection should close.
async fn handle_client_frame(
    conn_id: &str,
    text: &str,
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
) -> bool {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            warn!(conn_id, error = %e, "malformed WS frame, ignoring");
            return true;
        }
    };

    let reply = match frame.kind.as_str() {
        "subscribe" => json!({ "type": "presence", "status": "subscribed" }),
        "chat" | "voice" => json!({
            "type": "presence",
            "status": "unsupported",
            "reason": "chat/voice are handled by an external dialogue service, not this core"
        }),
        other => json!({ "type": "presence", "status": "ignored", "kind": other }),
    };
    let payload = serde_json::to_string(&reply).unwrap_or_default();
    tx.send(Message::Text(payload.into())).await.is_ok()
}
