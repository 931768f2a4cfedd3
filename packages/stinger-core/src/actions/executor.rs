//! Per-endpoint reveal → restart → delayed hide.
//!
//! [`ActionExecutor::perform`] spawns one independent task per control
//! endpoint. Each task walks `Locating → Activating → Playing`, then hands the
//! hide step to the [`RevertScheduler`]. A failure on one endpoint is logged
//! and never affects the others.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;

use super::scheduler::{RevertScheduler, ScheduledRevert};
use crate::control::{ControlEndpoint, MediaAction};
use crate::events::{ActionEvent, EventEmitter};
use crate::runtime::TokioSpawner;
use crate::utils::now_millis;

/// A media source inside a scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTarget {
    pub scene: String,
    pub source: String,
}

impl MediaTarget {
    pub fn new(scene: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            scene: scene.into(),
            source: source.into(),
        }
    }
}

/// Result of one endpoint's action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointOutcome {
    /// Shown and restarted; a revert is scheduled.
    Revealed,
    /// Endpoint was not connected.
    Skipped,
    /// The scene has no such source. Nothing was changed.
    NotFound,
    /// A request failed.
    Failed(String),
}

/// Handles of the per-endpoint tasks started by one `perform` call.
///
/// Dropping the ticket does not cancel anything.
#[derive(Default)]
pub struct PerformTicket {
    tasks: Vec<(String, JoinHandle<EndpointOutcome>)>,
}

impl PerformTicket {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for every endpoint and returns `(endpoint name, outcome)` pairs
    /// in endpoint order.
    pub async fn outcomes(self) -> Vec<(String, EndpointOutcome)> {
        let (names, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        let results = join_all(handles).await;
        names
            .into_iter()
            .zip(results)
            .map(|(name, result)| {
                let outcome = result.unwrap_or_else(|e| EndpointOutcome::Failed(e.to_string()));
                (name, outcome)
            })
            .collect()
    }
}

/// Runs media actions against control endpoints.
pub struct ActionExecutor {
    spawner: TokioSpawner,
    scheduler: Arc<dyn RevertScheduler>,
    emitter: Arc<dyn EventEmitter>,
}

impl ActionExecutor {
    pub fn new(
        spawner: TokioSpawner,
        scheduler: Arc<dyn RevertScheduler>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            spawner,
            scheduler,
            emitter,
        }
    }

    /// Reveals and restarts `target` on every endpoint, hiding it again after
    /// `reveal_delay`.
    ///
    /// Returns immediately; the returned ticket may be awaited or dropped.
    pub fn perform(
        &self,
        target: &MediaTarget,
        endpoints: &[Arc<ControlEndpoint>],
        reveal_delay: Duration,
    ) -> PerformTicket {
        log::info!(
            "[Executor] Playing '{}' in '{}' on {} endpoint(s)",
            target.source,
            target.scene,
            endpoints.len()
        );

        let tasks = endpoints
            .iter()
            .map(|endpoint| {
                let name = endpoint.name().to_string();
                let handle = self.spawner.spawn_joinable(reveal(
                    Arc::clone(endpoint),
                    target.clone(),
                    reveal_delay,
                    Arc::clone(&self.scheduler),
                    Arc::clone(&self.emitter),
                ));
                (name, handle)
            })
            .collect();

        PerformTicket { tasks }
    }

    /// Hides every item of `scene` on every connected endpoint.
    ///
    /// Returns the number of items hidden.
    pub async fn hide_all(&self, scene: &str, endpoints: &[Arc<ControlEndpoint>]) -> usize {
        let hidden = join_all(endpoints.iter().map(|endpoint| hide_scene(endpoint, scene))).await;
        hidden.into_iter().sum()
    }
}

async fn reveal(
    endpoint: Arc<ControlEndpoint>,
    target: MediaTarget,
    reveal_delay: Duration,
    scheduler: Arc<dyn RevertScheduler>,
    emitter: Arc<dyn EventEmitter>,
) -> EndpointOutcome {
    let name = endpoint.name().to_string();
    let Some(surface) = endpoint.surface() else {
        log::warn!("[Executor] {} not connected, skipping '{}'", name, target.source);
        return EndpointOutcome::Skipped;
    };

    log::debug!("[Executor] {} locating '{}'", name, target.source);
    let item_id = match surface.find_item(&target.scene, &target.source).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            log::error!(
                "[Executor] {} has no source '{}' in scene '{}'",
                name,
                target.source,
                target.scene
            );
            return EndpointOutcome::NotFound;
        }
        Err(e) => {
            log::error!("[Executor] {} failed to locate '{}': {}", name, target.source, e);
            return EndpointOutcome::Failed(e.to_string());
        }
    };

    log::debug!("[Executor] {} activating '{}'", name, target.source);
    if let Err(e) = surface.set_item_enabled(&target.scene, item_id, true).await {
        log::error!("[Executor] {} failed to show '{}': {}", name, target.source, e);
        return EndpointOutcome::Failed(e.to_string());
    }

    log::debug!("[Executor] {} playing '{}'", name, target.source);
    let restarted = surface
        .trigger_media_action(&target.source, MediaAction::Restart)
        .await;

    // Shown items are always scheduled for hiding, even if the restart failed.
    scheduler.schedule(ScheduledRevert {
        endpoint: Arc::clone(&endpoint),
        scene: target.scene.clone(),
        item_id,
        source: target.source.clone(),
        delay: reveal_delay,
    });

    match restarted {
        Ok(()) => {
            log::info!("[Executor] {} showing '{}' for {:?}", name, target.source, reveal_delay);
            emitter.emit_action(ActionEvent::Revealed {
                endpoint: name,
                scene: target.scene,
                source: target.source,
                timestamp: now_millis(),
            });
            EndpointOutcome::Revealed
        }
        Err(e) => {
            log::error!("[Executor] {} failed to restart '{}': {}", name, target.source, e);
            EndpointOutcome::Failed(e.to_string())
        }
    }
}

async fn hide_scene(endpoint: &ControlEndpoint, scene: &str) -> usize {
    let Some(surface) = endpoint.surface() else {
        log::warn!("[Executor] {} not connected, cannot hide '{}'", endpoint.name(), scene);
        return 0;
    };

    let items = match surface.scene_items(scene).await {
        Ok(items) => items,
        Err(e) => {
            log::error!("[Executor] {} failed to list '{}': {}", endpoint.name(), scene, e);
            return 0;
        }
    };

    let mut hidden = 0;
    for item in items {
        match surface.set_item_enabled(scene, item.scene_item_id, false).await {
            Ok(()) => hidden += 1,
            Err(e) => log::error!(
                "[Executor] {} failed to hide '{}': {}",
                endpoint.name(),
                item.source_name,
                e
            ),
        }
    }
    log::info!("[Executor] {} hid {} item(s) in '{}'", endpoint.name(), hidden, scene);
    hidden
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::TokioRevertScheduler;
    use crate::control::testing::{connected_endpoint, offline_endpoint, FakeSurface, SurfaceCall};
    use crate::control::ControlSurface;
    use crate::events::NoopEventEmitter;
    use parking_lot::Mutex;

    const SCENE: &str = "SCN Win Animation";
    const SOURCE: &str = "WIN HSMW BLAU.mp4";

    fn executor() -> ActionExecutor {
        let emitter: Arc<dyn EventEmitter> = Arc::new(NoopEventEmitter);
        ActionExecutor::new(
            TokioSpawner::current(),
            Arc::new(TokioRevertScheduler::new(TokioSpawner::current(), emitter.clone())),
            emitter,
        )
    }

    fn win_surface() -> Arc<FakeSurface> {
        Arc::new(FakeSurface::new().with_item(SCENE, 11, SOURCE).with_item(SCENE, 12, "WIN LES PINK.mp4"))
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_restart_then_hide_after_delay() {
        let surface = win_surface();
        let endpoint = connected_endpoint("obs-1", surface.clone()).await;

        let outcomes = executor()
            .perform(&MediaTarget::new(SCENE, SOURCE), &[endpoint], Duration::from_secs(10))
            .outcomes()
            .await;

        assert_eq!(outcomes, vec![("obs-1".to_string(), EndpointOutcome::Revealed)]);
        assert_eq!(
            surface.calls(),
            vec![
                SurfaceCall::SetEnabled { scene: SCENE.into(), item_id: 11, enabled: true },
                SurfaceCall::Media { input: SOURCE.into(), action: MediaAction::Restart },
            ]
        );

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(
            surface.calls().last(),
            Some(&SurfaceCall::SetEnabled { scene: SCENE.into(), item_id: 11, enabled: false })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn endpoints_are_isolated() {
        let healthy = win_surface();
        let broken = win_surface();
        let healthy_endpoint = connected_endpoint("obs-1", healthy.clone()).await;
        let broken_endpoint = connected_endpoint("obs-2", broken.clone()).await;
        // Closed underneath the endpoint: every request fails.
        broken.close().await;

        let outcomes = executor()
            .perform(
                &MediaTarget::new(SCENE, SOURCE),
                &[broken_endpoint, offline_endpoint("obs-3"), healthy_endpoint],
                Duration::from_secs(10),
            )
            .outcomes()
            .await;

        assert!(matches!(outcomes[0].1, EndpointOutcome::Failed(_)));
        assert_eq!(outcomes[1], ("obs-3".to_string(), EndpointOutcome::Skipped));
        assert_eq!(outcomes[2], ("obs-1".to_string(), EndpointOutcome::Revealed));
        assert_eq!(healthy.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_source_changes_nothing() {
        let surface = win_surface();
        let endpoint = connected_endpoint("obs-1", surface.clone()).await;

        let outcomes = executor()
            .perform(&MediaTarget::new(SCENE, "WIN NOBODY BLAU.mp4"), &[endpoint], Duration::from_secs(10))
            .outcomes()
            .await;

        assert_eq!(outcomes[0].1, EndpointOutcome::NotFound);
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(surface.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reverts_go_through_the_scheduler() {
        struct Recording(Mutex<Vec<(String, i64, Duration)>>);
        impl RevertScheduler for Recording {
            fn schedule(&self, revert: ScheduledRevert) {
                self.0
                    .lock()
                    .push((revert.endpoint.name().to_string(), revert.item_id, revert.delay));
            }
        }

        let recording = Arc::new(Recording(Mutex::new(Vec::new())));
        let executor = ActionExecutor::new(
            TokioSpawner::current(),
            recording.clone(),
            Arc::new(NoopEventEmitter),
        );
        let endpoint = connected_endpoint("obs-1", win_surface()).await;

        executor
            .perform(&MediaTarget::new(SCENE, SOURCE), &[endpoint], Duration::from_secs(70))
            .outcomes()
            .await;

        assert_eq!(
            *recording.0.lock(),
            vec![("obs-1".to_string(), 11, Duration::from_secs(70))]
        );
    }

    #[tokio::test]
    async fn hide_all_disables_every_item() {
        let first = win_surface();
        let second = win_surface();
        let endpoints = vec![
            connected_endpoint("obs-1", first.clone()).await,
            connected_endpoint("obs-2", second.clone()).await,
            offline_endpoint("obs-3"),
        ];

        let hidden = executor().hide_all(SCENE, &endpoints).await;

        assert_eq!(hidden, 4);
        assert!(first
            .calls()
            .iter()
            .all(|call| matches!(call, SurfaceCall::SetEnabled { enabled: false, .. })));
    }
}
