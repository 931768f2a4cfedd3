//! Control surfaces: endpoints that can show, restart and hide media.
//!
//! These traits enable dependency injection for testability. The executor and
//! supervisor depend on [`ControlSurface`] / [`ControlConnector`] rather than
//! on the obs-websocket client in [`obs`].

mod endpoint;
pub mod obs;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::endpoint::EndpointConfig;

pub use endpoint::ControlEndpoint;
pub use obs::ObsConnector;

/// Errors raised by a control surface.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The remote side rejected a request.
    #[error("{request} failed (code {code}): {comment}")]
    RequestFailed {
        request: String,
        code: i64,
        comment: String,
    },

    /// No response arrived in time.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The socket failed or closed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The connection handshake did not complete.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The server requires a password but none is configured.
    #[error("server requires authentication but no password is configured")]
    AuthenticationRequired,
}

/// Convenient Result alias for control operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// One item inside a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneItem {
    pub scene_item_id: i64,
    pub source_name: String,
}

/// Media transport actions a surface can perform on an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaAction {
    Restart,
}

impl MediaAction {
    /// Returns the obs-websocket identifier for this action.
    pub fn as_obs_str(&self) -> &'static str {
        match self {
            Self::Restart => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_RESTART",
        }
    }
}

/// A live connection to a control endpoint.
#[async_trait]
pub trait ControlSurface: Send + Sync {
    /// Lists the items of a scene.
    async fn scene_items(&self, scene: &str) -> ControlResult<Vec<SceneItem>>;

    /// Finds the item id of `source` in `scene`.
    ///
    /// Returns `Ok(None)` when the scene exists but has no such source.
    async fn find_item(&self, scene: &str, source: &str) -> ControlResult<Option<i64>> {
        let items = self.scene_items(scene).await?;
        Ok(items
            .into_iter()
            .find(|item| item.source_name == source)
            .map(|item| item.scene_item_id))
    }

    /// Shows or hides a scene item.
    async fn set_item_enabled(&self, scene: &str, item_id: i64, enabled: bool) -> ControlResult<()>;

    /// Triggers a media action on an input (by source name).
    async fn trigger_media_action(&self, input: &str, action: MediaAction) -> ControlResult<()>;

    /// Cheap idempotent round trip used as a liveness check.
    async fn probe(&self) -> ControlResult<()>;

    /// Closes the underlying transport. Further calls fail.
    async fn close(&self);
}

/// Opens new connections to control endpoints.
#[async_trait]
pub trait ControlConnector: Send + Sync {
    /// Connects and completes any handshake.
    async fn connect(&self, config: &EndpointConfig) -> ControlResult<Arc<dyn ControlSurface>>;
}
