//! Delayed hiding of revealed sources.

use std::sync::Arc;
use std::time::Duration;

use crate::control::ControlEndpoint;
use crate::events::{ActionEvent, EventEmitter};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::utils::now_millis;

/// A pending "hide this item again" action.
///
/// Fire-and-forget: once scheduled it cannot be cancelled, and any number may
/// be outstanding for the same item.
pub struct ScheduledRevert {
    pub endpoint: Arc<ControlEndpoint>,
    pub scene: String,
    pub item_id: i64,
    pub source: String,
    pub delay: Duration,
}

impl ScheduledRevert {
    /// Hides the item through the endpoint's surface at the time of the call.
    ///
    /// Returns false if the endpoint is offline or the request fails.
    pub async fn run(self, emitter: &dyn EventEmitter) -> bool {
        let name = self.endpoint.name().to_string();
        let Some(surface) = self.endpoint.surface() else {
            log::warn!(
                "[Executor] {} not connected, cannot hide '{}' in '{}'",
                name,
                self.source,
                self.scene
            );
            return false;
        };

        log::debug!("[Executor] {} deactivating '{}'", name, self.source);
        match surface
            .set_item_enabled(&self.scene, self.item_id, false)
            .await
        {
            Ok(()) => {
                log::info!("[Executor] {} hid '{}' in '{}'", name, self.source, self.scene);
                emitter.emit_action(ActionEvent::Reverted {
                    endpoint: name,
                    scene: self.scene,
                    source: self.source,
                    timestamp: now_millis(),
                });
                true
            }
            Err(e) => {
                log::error!("[Executor] {} failed to hide '{}': {}", name, self.source, e);
                false
            }
        }
    }
}

/// Schedules reverts. A seam for adding cancellation later.
pub trait RevertScheduler: Send + Sync {
    fn schedule(&self, revert: ScheduledRevert);
}

/// Sleeps on a detached Tokio task, then runs the revert.
pub struct TokioRevertScheduler {
    spawner: TokioSpawner,
    emitter: Arc<dyn EventEmitter>,
}

impl TokioRevertScheduler {
    pub fn new(spawner: TokioSpawner, emitter: Arc<dyn EventEmitter>) -> Self {
        Self { spawner, emitter }
    }
}

impl RevertScheduler for TokioRevertScheduler {
    fn schedule(&self, revert: ScheduledRevert) {
        let emitter = Arc::clone(&self.emitter);
        self.spawner.spawn(async move {
            tokio::time::sleep(revert.delay).await;
            revert.run(emitter.as_ref()).await;
        });
    }
}
