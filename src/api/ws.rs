//! WebSocket endpoint: the real-time broadcast stream.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tracing::debug;

use super::AppState;

pub async fn handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve(socket, state))
}

async fn serve(socket: WebSocket, state: AppState) {
    let mut events = state.broadcast.subscribe();
    let (mut sink, mut inbound) = socket.split();
    debug!("websocket client connected");

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(message) => {
                        let Ok(payload) = serde_json::to_string(&message) else {
                            continue;
                        };
                        if sink.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    // Fell behind the broadcast channel; skip the lost
                    // messages and keep streaming.
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "websocket client lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = inbound.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) if text.trim() == "ping" => {
                        let pong = json!({
                            "type": "pong",
                            "timestamp": Utc::now().to_rfc3339(),
                            "data": {},
                        });
                        if sink.send(Message::Text(pong.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    debug!("websocket client disconnected");
}
