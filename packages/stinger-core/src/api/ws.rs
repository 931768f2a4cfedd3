//! WebSocket handler for the command side channel.
//!
//! One JSON command per text frame, one JSON response per command. Bad
//! commands are answered with an error response; the socket stays open.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;

use super::commands;
use super::ApiState;

fn to_message(value: &Value) -> Message {
    Message::Text(value.to_string().into())
}

/// WebSocket upgrade handler.
pub async fn command_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: ApiState) {
    let (mut sender, mut receiver) = socket.split();

    let conn_guard = state.ws_manager.register();
    let cancel_token = conn_guard.cancel_token().clone();

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log::info!("[Commands] Connection force-closed: {}", conn_guard.id());
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        log::debug!("[Commands] {} -> {}", conn_guard.id(), text.as_str());
                        let response = commands::respond(&state.orchestrator, text.as_str()).await;
                        conn_guard.record_command();
                        if sender.send(to_message(&response)).await.is_err() {
                            log::warn!("[Commands] Failed to answer {}, client gone", conn_guard.id());
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        log::debug!("[Commands] Ignoring binary frame from {}", conn_guard.id());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::warn!("[Commands] Socket error on {}: {}", conn_guard.id(), e);
                        break;
                    }
                }
            }
        }
    }
}
