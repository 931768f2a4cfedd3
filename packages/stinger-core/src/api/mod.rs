//! Command side channel served over axum.
//!
//! Handlers are thin: they parse and delegate to the [`Orchestrator`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::services::Orchestrator;

pub mod commands;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::WsConnectionManager;

/// Errors that can occur when starting or running the command server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind command server to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command server failed: {0}")]
    Serve(#[from] std::io::Error),
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub ws_manager: Arc<WsConnectionManager>,
}

impl ApiState {
    pub fn new(orchestrator: Arc<Orchestrator>, ws_manager: Arc<WsConnectionManager>) -> Self {
        Self {
            orchestrator,
            ws_manager,
        }
    }
}

/// Builds the command server router.
///
/// `/` upgrades to the command socket; `/health` reports endpoint states and
/// the connected command clients.
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(ws::command_ws_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> Json<Value> {
    let endpoints: Vec<Value> = state
        .orchestrator
        .endpoints()
        .iter()
        .map(|endpoint| {
            json!({
                "name": endpoint.name(),
                "state": endpoint.handle().state(),
            })
        })
        .collect();
    let (_, current_match) = state.orchestrator.matches();

    Json(json!({
        "status": "ok",
        "endpoints": endpoints,
        "client_count": state.ws_manager.connection_count(),
        "clients": state.ws_manager.clients(),
        "current_match": current_match,
    }))
}

/// Binds the command server listener.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener, ServerError> {
    let addr = format!("{}:{}", host, port);
    TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Serves commands on `listener` until `cancel` fires.
///
/// On cancellation every open command socket is force-closed before the
/// server drains.
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let local: Option<SocketAddr> = listener.local_addr().ok();
    if let Some(addr) = local {
        log::info!("[Commands] Listening on ws://{}", addr);
    }

    let ws_manager = Arc::clone(&state.ws_manager);
    let app = create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            ws_manager.close_all();
        })
        .await?;

    log::info!("[Commands] Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::test_orchestrator;
    use futures::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::{connect_async, tungstenite::Message};

    async fn running_server() -> (SocketAddr, ApiState, CancellationToken, tokio::task::JoinHandle<Result<(), ServerError>>) {
        let state = ApiState::new(test_orchestrator().await, Arc::new(WsConnectionManager::new()));
        let listener = bind("127.0.0.1", 0).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve(listener, state.clone(), cancel.clone()));
        (addr, state, cancel, server)
    }

    async fn next_json<S>(stream: &mut S) -> Value
    where
        S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("unexpected frame: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn answers_commands_and_survives_bad_input() {
        let (addr, _state, cancel, server) = running_server().await;
        let (mut client, _) = connect_async(format!("ws://{}/", addr)).await.unwrap();

        client.send(Message::Text("not json".into())).await.unwrap();
        let response = next_json(&mut client).await;
        assert_eq!(response["status"], "error");
        assert_eq!(response["message"], "Invalid JSON");

        client
            .send(Message::Text(r#"{"command":"SET_MATCH","match_index":3}"#.into()))
            .await
            .unwrap();
        let response = next_json(&mut client).await;
        assert_eq!(response["status"], "success");
        assert_eq!(response["command"], "set_match");

        client
            .send(Message::Text(r#"{"command":"get_current_match"}"#.into()))
            .await
            .unwrap();
        let response = next_json(&mut client).await;
        assert_eq!(response["status"], "success");
        assert_eq!(response["match_index"], 3);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server should stop after cancellation")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_force_closes_clients() {
        let (addr, state, cancel, server) = running_server().await;
        let (mut client, _) = connect_async(format!("ws://{}/", addr)).await.unwrap();

        client
            .send(Message::Text(r#"{"command":"list_matches"}"#.into()))
            .await
            .unwrap();
        next_json(&mut client).await;
        assert_eq!(state.ws_manager.connection_count(), 1);

        cancel.cancel();

        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match client.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(closed.is_ok());

        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server should drain")
            .unwrap()
            .unwrap();
        assert_eq!(state.ws_manager.connection_count(), 0);
    }

    #[tokio::test]
    async fn health_reports_endpoints() {
        let state = ApiState::new(test_orchestrator().await, Arc::new(WsConnectionManager::new()));

        let Json(body) = health(State(state)).await;

        assert_eq!(body["status"], "ok");
        assert_eq!(body["endpoints"][0]["name"], "obs-1");
        assert_eq!(body["clients"], json!([]));
    }

    #[tokio::test]
    async fn health_lists_connected_clients() {
        let manager = Arc::new(WsConnectionManager::new());
        let state = ApiState::new(test_orchestrator().await, Arc::clone(&manager));
        let guard = manager.register();

        let Json(body) = health(State(state.clone())).await;
        assert_eq!(body["client_count"], 1);
        assert_eq!(body["clients"][0]["id"], guard.id());
        assert_eq!(body["clients"][0]["commands"], 0);

        drop(guard);
        let Json(body) = health(State(state)).await;
        assert_eq!(body["clients"], json!([]));
    }
}
