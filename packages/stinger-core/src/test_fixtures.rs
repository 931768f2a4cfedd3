//! Shared builders for orchestrator-level tests.

use std::sync::Arc;

use crate::actions::{ActionExecutor, TokioRevertScheduler};
use crate::control::testing::{connected_endpoint, FakeSurface};
use crate::events::{EventEmitter, NoopEventEmitter};
use crate::runtime::TokioSpawner;
use crate::services::{MatchStatePersistence, NoopMatchStatePersistence, Orchestrator};
use crate::state::{default_matches, MatchState, SceneConfig, TimingConfig};

/// A surface holding every default scene item the orchestrator touches.
///
/// Item ids: win videos 1-2, audio 10-13, goal video 20, matchup 30-31.
pub(crate) fn obs_surface() -> Arc<FakeSurface> {
    let scenes = SceneConfig::default();
    Arc::new(
        FakeSurface::new()
            .with_item(&scenes.win_scene, 1, "WIN HSMW BLAU.mp4")
            .with_item(&scenes.win_scene, 2, "WIN UIA B PINK.mp4")
            .with_item(&scenes.audio_scene, 10, &scenes.audio_source)
            .with_item(&scenes.audio_scene, 11, &scenes.goal_audio_source)
            .with_item(&scenes.audio_scene, 12, &scenes.matchup_audio_source)
            .with_item(&scenes.audio_scene, 13, &scenes.matchup_audio_finale_source)
            .with_item(&scenes.goal_video_scene, 20, &scenes.goal_video_source)
            .with_item(&scenes.matchup_scene, 30, "HSMW vs UIA.mp4")
            .with_item(&scenes.matchup_scene, 31, "HSMW vs HSMW.mp4"),
    )
}

/// An orchestrator over endpoints `obs-1..obs-N`, each connected to one surface.
pub(crate) async fn orchestrator_with(
    surfaces: &[Arc<FakeSurface>],
    persistence: Arc<dyn MatchStatePersistence>,
) -> Arc<Orchestrator> {
    let mut endpoints = Vec::new();
    for (i, surface) in surfaces.iter().enumerate() {
        endpoints.push(connected_endpoint(&format!("obs-{}", i + 1), Arc::clone(surface)).await);
    }
    let emitter: Arc<dyn EventEmitter> = Arc::new(NoopEventEmitter);
    let executor = ActionExecutor::new(
        TokioSpawner::current(),
        Arc::new(TokioRevertScheduler::new(TokioSpawner::current(), emitter.clone())),
        emitter,
    );
    Arc::new(Orchestrator::new(
        endpoints,
        executor,
        SceneConfig::default(),
        TimingConfig::default(),
        MatchState::new(default_matches(), 0),
        persistence,
    ))
}

/// One endpoint with [`obs_surface`] and no persistence.
pub(crate) async fn test_orchestrator() -> Arc<Orchestrator> {
    orchestrator_with(&[obs_surface()], Arc::new(NoopMatchStatePersistence)).await
}
