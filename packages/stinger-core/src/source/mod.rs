//! Event source client: listens to the match-event relay.
//!
//! The listening loop connects through the supervisor, hands the router a
//! sink for outbound frames, and feeds every text frame to
//! [`EventRouter::dispatch`] in arrival order. When the socket closes or
//! fails it reconnects straight away; there is no separate health probe.
//!
//! Connection lifecycle is published in-process on the `ws` channel:
//! `ws:open`, `ws:close` and `ws:error` (`{"error": "<reason>"}`).

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::endpoint::{ConnectionError, ConnectionState, ConnectionSupervisor, EndpointConfig, EndpointHandle};
use crate::events::EventEmitter;
use crate::protocol_constants::LIFECYCLE_CHANNEL;
use crate::router::{EventRouter, RouterSink};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Time allowed for the writer to send a close frame at the end of a session.
const WRITER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// How a session ended.
enum SessionEnd {
    Closed,
    Failed(String),
    Cancelled,
}

/// Client for the event-source endpoint.
pub struct EventSourceClient {
    handle: EndpointHandle,
    router: Arc<EventRouter>,
    supervisor: Arc<ConnectionSupervisor>,
}

impl EventSourceClient {
    pub fn new(
        config: EndpointConfig,
        router: Arc<EventRouter>,
        supervisor: Arc<ConnectionSupervisor>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            handle: EndpointHandle::new(config, emitter),
            router,
            supervisor,
        }
    }

    pub fn handle(&self) -> &EndpointHandle {
        &self.handle
    }

    /// Connects, listens and reconnects until shutdown.
    pub async fn run(&self) {
        let url = self.handle.config().url();
        log::info!("[Source] Listening to {} at {}", self.handle.name(), url);

        loop {
            let connected = self
                .supervisor
                .ensure_connected(&self.handle, || {
                    let url = url.clone();
                    async move {
                        connect_async(url.as_str())
                            .await
                            .map(|(ws, _)| ws)
                            .map_err(|e| ConnectionError::Transport(e.to_string()))
                    }
                })
                .await;

            let ws = match connected {
                Ok(ws) => ws,
                Err(ConnectionError::Cancelled) => break,
                Err(e) => {
                    log::error!("[Source] {} stopped: {}", self.handle.name(), e);
                    return;
                }
            };
            log::info!("[Source] Connected to {}", self.handle.name());

            match self.serve(ws).await {
                SessionEnd::Cancelled => break,
                SessionEnd::Closed => {
                    log::warn!("[Source] {} closed the connection", self.handle.name());
                    self.handle.set_state(ConnectionState::Disconnected);
                    self.router
                        .publish_local(LIFECYCLE_CHANNEL, "close", Value::Null)
                        .await;
                }
                SessionEnd::Failed(reason) => {
                    log::warn!("[Source] {} connection failed: {}", self.handle.name(), reason);
                    self.handle.set_state(ConnectionState::Disconnected);
                    self.router
                        .publish_local(LIFECYCLE_CHANNEL, "error", json!({ "error": reason }))
                        .await;
                }
            }
        }

        self.handle.set_state(ConnectionState::Closed);
        log::info!("[Source] Listener for {} stopped", self.handle.name());
    }

    /// Runs one connected session until the socket ends or shutdown.
    async fn serve(&self, ws: WsStream) -> SessionEnd {
        let cancel = self.supervisor.cancel_token().clone();
        let (mut ws_tx, mut ws_rx) = ws.split();
        let (sink, mut outbound) = RouterSink::channel();

        let writer = tokio::spawn(async move {
            while let Some(text) = outbound.recv().await {
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    return;
                }
            }
            let _ = ws_tx.close().await;
        });

        self.router.on_connected(sink);
        self.router
            .publish_local(LIFECYCLE_CHANNEL, "open", Value::Null)
            .await;

        let end = loop {
            tokio::select! {
                _ = cancel.cancelled() => break SessionEnd::Cancelled,
                frame = ws_rx.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.router.dispatch(&text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break SessionEnd::Closed,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break SessionEnd::Failed(e.to_string()),
                }
            }
        };

        // Dropping the router's sink lets the writer drain and close.
        self.router.on_disconnected();
        if tokio::time::timeout(WRITER_SHUTDOWN_TIMEOUT, writer).await.is_err() {
            log::debug!("[Source] Writer did not finish within {:?}", WRITER_SHUTDOWN_TIMEOUT);
        }
        end
    }
}
