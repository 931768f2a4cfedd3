//! obs-websocket v5 client.
//!
//! Thin client over `tokio-tungstenite`; only implements the requests the
//! executor needs (scene item lookup, enable/disable, media actions, version
//! probe). One handler task owns the socket and matches responses to pending
//! requests by `requestId`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::{ControlConnector, ControlError, ControlResult, ControlSurface, MediaAction, SceneItem};
use crate::endpoint::EndpointConfig;
use crate::protocol_constants::{
    OBS_OP_HELLO, OBS_OP_IDENTIFIED, OBS_OP_IDENTIFY, OBS_OP_REQUEST, OBS_OP_REQUEST_RESPONSE,
    OBS_REQUEST_TIMEOUT_SECS, OBS_RPC_VERSION, OBS_SUBPROTOCOL,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type PendingTx = oneshot::Sender<ControlResult<Value>>;

/// Close code sent by obs-websocket when the authentication string is wrong.
const CLOSE_AUTHENTICATION_FAILED: u16 = 4009;

#[derive(Deserialize)]
struct Envelope {
    op: u8,
    #[serde(default)]
    d: Value,
}

#[derive(Deserialize)]
struct Hello {
    #[serde(default)]
    authentication: Option<AuthChallenge>,
}

#[derive(Deserialize)]
struct AuthChallenge {
    challenge: String,
    salt: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Identify {
    rpc_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    authentication: Option<String>,
    event_subscriptions: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestResponse {
    request_type: String,
    request_id: String,
    request_status: RequestStatus,
    #[serde(default)]
    response_data: Value,
}

#[derive(Deserialize)]
struct RequestStatus {
    result: bool,
    code: i64,
    #[serde(default)]
    comment: Option<String>,
}

struct ObsCommand {
    request_type: String,
    data: Value,
    response_tx: PendingTx,
}

/// Response senders keyed by request id.
///
/// A caller that timed out has dropped its receiver; those entries are swept
/// whenever a new request is added.
#[derive(Default)]
struct PendingRequests {
    senders: HashMap<String, PendingTx>,
}

impl PendingRequests {
    fn insert(&mut self, request_id: String, tx: PendingTx) {
        self.senders.retain(|_, tx| !tx.is_closed());
        self.senders.insert(request_id, tx);
    }

    fn take(&mut self, request_id: &str) -> Option<PendingTx> {
        self.senders.remove(request_id)
    }

    fn len(&self) -> usize {
        self.senders.len()
    }
}

/// Computes the obs-websocket authentication string:
/// `base64(sha256(base64(sha256(password + salt)) + challenge))`.
pub fn authentication_string(password: &str, salt: &str, challenge: &str) -> String {
    let engine = base64::engine::general_purpose::STANDARD;
    let secret = engine.encode(Sha256::digest(format!("{password}{salt}").as_bytes()));
    engine.encode(Sha256::digest(format!("{secret}{challenge}").as_bytes()))
}

/// Opens obs-websocket sessions.
pub struct ObsConnector {
    request_timeout: Duration,
}

impl ObsConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl Default for ObsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(OBS_REQUEST_TIMEOUT_SECS))
    }
}

#[async_trait]
impl ControlConnector for ObsConnector {
    async fn connect(&self, config: &EndpointConfig) -> ControlResult<Arc<dyn ControlSurface>> {
        let session = ObsSession::connect(config, self.request_timeout).await?;
        Ok(Arc::new(session) as Arc<dyn ControlSurface>)
    }
}

/// One identified obs-websocket connection.
pub struct ObsSession {
    name: String,
    cmd_tx: mpsc::Sender<ObsCommand>,
    request_timeout: Duration,
    cancel: CancellationToken,
    handler: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ObsSession {
    /// Connects and completes the Hello/Identify handshake.
    pub async fn connect(config: &EndpointConfig, request_timeout: Duration) -> ControlResult<Self> {
        let mut request = config
            .url()
            .into_client_request()
            .map_err(|e| ControlError::Handshake(e.to_string()))?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(OBS_SUBPROTOCOL),
        );

        let (mut ws, _) = tokio::time::timeout(request_timeout, connect_async(request))
            .await
            .map_err(|_| ControlError::Timeout(format!("connecting to {}", config.url())))?
            .map_err(|e| ControlError::Transport(e.to_string()))?;

        tokio::time::timeout(request_timeout, identify(&mut ws, config.password.as_deref()))
            .await
            .map_err(|_| ControlError::Timeout("obs-websocket handshake".into()))??;

        log::debug!("[Obs] {} identified", config.name);

        let (cmd_tx, cmd_rx) = mpsc::channel::<ObsCommand>(64);
        let cancel = CancellationToken::new();
        let handler = tokio::spawn(obs_handler_loop(
            config.name.clone(),
            ws,
            cmd_rx,
            cancel.clone(),
        ));

        Ok(Self {
            name: config.name.clone(),
            cmd_tx,
            request_timeout,
            cancel,
            handler: parking_lot::Mutex::new(Some(handler)),
        })
    }

    /// Sends one request and waits for its response data.
    pub async fn request(&self, request_type: &str, data: Value) -> ControlResult<Value> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(ObsCommand {
                request_type: request_type.to_string(),
                data,
                response_tx: tx,
            })
            .await
            .map_err(|_| ControlError::Transport(format!("{} connection closed", self.name)))?;

        tokio::time::timeout(self.request_timeout, rx)
            .await
            .map_err(|_| ControlError::Timeout(request_type.to_string()))?
            .map_err(|_| ControlError::Transport(format!("{} connection closed", self.name)))?
    }
}

#[async_trait]
impl ControlSurface for ObsSession {
    async fn scene_items(&self, scene: &str) -> ControlResult<Vec<SceneItem>> {
        let data = self
            .request("GetSceneItemList", json!({ "sceneName": scene }))
            .await?;
        serde_json::from_value(data.get("sceneItems").cloned().unwrap_or(Value::Null))
            .map_err(|e| ControlError::Transport(format!("malformed GetSceneItemList response: {e}")))
    }

    async fn set_item_enabled(&self, scene: &str, item_id: i64, enabled: bool) -> ControlResult<()> {
        self.request(
            "SetSceneItemEnabled",
            json!({
                "sceneName": scene,
                "sceneItemId": item_id,
                "sceneItemEnabled": enabled,
            }),
        )
        .await
        .map(|_| ())
    }

    async fn trigger_media_action(&self, input: &str, action: MediaAction) -> ControlResult<()> {
        self.request(
            "TriggerMediaInputAction",
            json!({
                "inputName": input,
                "mediaAction": action.as_obs_str(),
            }),
        )
        .await
        .map(|_| ())
    }

    async fn probe(&self) -> ControlResult<()> {
        self.request("GetVersion", Value::Null).await.map(|_| ())
    }

    async fn close(&self) {
        self.cancel.cancel();
        let handler = self.handler.lock().take();
        if let Some(handler) = handler {
            let _ = tokio::time::timeout(Duration::from_secs(1), handler).await;
        }
    }
}

impl Drop for ObsSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Waits for Hello, sends Identify and waits for Identified.
async fn identify(ws: &mut WsStream, password: Option<&str>) -> ControlResult<()> {
    let hello: Hello = serde_json::from_value(read_op(ws, OBS_OP_HELLO).await?)
        .map_err(|e| ControlError::Handshake(format!("malformed Hello: {e}")))?;

    let authentication = match (hello.authentication, password) {
        (None, _) => None,
        (Some(_), None) => return Err(ControlError::AuthenticationRequired),
        (Some(auth), Some(password)) => Some(authentication_string(
            password,
            &auth.salt,
            &auth.challenge,
        )),
    };

    let identify = Identify {
        rpc_version: OBS_RPC_VERSION,
        authentication,
        event_subscriptions: 0,
    };
    let identify = json!({ "op": OBS_OP_IDENTIFY, "d": identify });
    ws.send(Message::Text(identify.to_string().into()))
        .await
        .map_err(|e| ControlError::Transport(e.to_string()))?;

    read_op(ws, OBS_OP_IDENTIFIED).await.map(|_| ())
}

/// Reads frames until one with the given op code arrives.
async fn read_op(ws: &mut WsStream, op: u8) -> ControlResult<Value> {
    while let Some(frame) = ws.next().await {
        match frame.map_err(|e| ControlError::Transport(e.to_string()))? {
            Message::Text(text) => {
                let Ok(envelope) = serde_json::from_str::<Envelope>(&text) else {
                    continue;
                };
                if envelope.op == op {
                    return Ok(envelope.d);
                }
            }
            Message::Close(Some(frame)) if u16::from(frame.code) == CLOSE_AUTHENTICATION_FAILED => {
                return Err(ControlError::Handshake("authentication failed".into()));
            }
            Message::Close(frame) => {
                let reason = frame.map(|f| f.reason.as_str().to_string()).unwrap_or_default();
                return Err(ControlError::Handshake(format!(
                    "server closed the connection: {reason}"
                )));
            }
            _ => {}
        }
    }
    Err(ControlError::Handshake("connection closed during handshake".into()))
}

async fn obs_handler_loop(
    name: String,
    ws: WsStream,
    mut cmd_rx: mpsc::Receiver<ObsCommand>,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut pending = PendingRequests::default();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ws_tx.close().await;
                break;
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                let request_id = uuid::Uuid::new_v4().to_string();
                let msg = json!({
                    "op": OBS_OP_REQUEST,
                    "d": {
                        "requestType": cmd.request_type,
                        "requestId": request_id,
                        "requestData": cmd.data,
                    },
                });
                pending.insert(request_id, cmd.response_tx);
                if ws_tx.send(Message::Text(msg.to_string().into())).await.is_err() {
                    break;
                }
            }
            frame = ws_rx.next() => {
                let Some(Ok(frame)) = frame else { break };
                let text = match frame {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };
                let Ok(envelope) = serde_json::from_str::<Envelope>(&text) else {
                    continue;
                };
                if envelope.op != OBS_OP_REQUEST_RESPONSE {
                    continue;
                }
                let Ok(response) = serde_json::from_value::<RequestResponse>(envelope.d) else {
                    log::warn!("[Obs] {} sent a malformed RequestResponse", name);
                    continue;
                };
                if let Some(tx) = pending.take(&response.request_id) {
                    let status = response.request_status;
                    let result = if status.result {
                        Ok(response.response_data)
                    } else {
                        Err(ControlError::RequestFailed {
                            request: response.request_type,
                            code: status.code,
                            comment: status.comment.unwrap_or_default(),
                        })
                    };
                    let _ = tx.send(result);
                }
            }
        }
    }

    // Pending senders are dropped here; waiting callers see a closed connection.
    log::debug!("[Obs] {} handler stopped with {} pending request(s)", name, pending.len());
}
