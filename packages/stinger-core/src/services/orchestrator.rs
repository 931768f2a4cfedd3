//! Match-event orchestration.
//!
//! Wires domain events to media actions:
//! - `game:match_ended` → win video for the winning team plus the win stinger audio
//! - `game:goal_scored` → goal video plus goal audio
//!
//! Operators can trigger the same actions (and the pre-match matchup
//! animation) through the command API, and select which scheduled match is on
//! air.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::actions::{ActionExecutor, EndpointOutcome, MediaTarget, PerformTicket};
use crate::control::ControlEndpoint;
use crate::error::{StingerError, StingerResult};
use crate::events::{BroadcastEvent, EndpointEvent};
use crate::router::{Callback, EventRouter};
use crate::state::{MatchPairing, MatchState, SceneConfig, TimingConfig};

/// Index of the final match, which gets the finale matchup audio.
const FINALE_MATCH_INDEX: usize = 6;

/// Persists the selected match so a restart resumes where it left off.
pub trait MatchStatePersistence: Send + Sync {
    fn save_current_match(&self, index: usize) -> StingerResult<()>;
}

/// Keeps the selection in memory only.
pub struct NoopMatchStatePersistence;

impl MatchStatePersistence for NoopMatchStatePersistence {
    fn save_current_match(&self, _index: usize) -> StingerResult<()> {
        Ok(())
    }
}

/// `WIN <team> <color>.mp4`
pub fn win_video_name(team: &str, color: &str) -> String {
    format!("WIN {team} {color}.mp4")
}

/// Maps every `UIA` variant (`UIA A`, `UIA B`) to `UIA`; other names pass through.
pub fn normalize_team_name(team: &str) -> &str {
    if team.starts_with("UIA") {
        "UIA"
    } else {
        team
    }
}

/// `<blue> vs <orange>.mp4` with normalized team names.
pub fn matchup_video_name(pairing: &MatchPairing) -> String {
    format!(
        "{} vs {}.mp4",
        normalize_team_name(&pairing.blue_team),
        normalize_team_name(&pairing.orange_team)
    )
}

/// Operator-facing label of a team number (0 = blue, anything else = orange).
pub fn team_label(team_num: i64) -> &'static str {
    if team_num == 0 {
        "Blue/Cyan"
    } else {
        "Orange/Pink"
    }
}

/// Media started by one orchestrator call.
#[derive(Default)]
pub struct Playback {
    /// What was played, in start order.
    pub targets: Vec<MediaTarget>,
    tickets: Vec<PerformTicket>,
}

impl Playback {
    fn push(&mut self, target: MediaTarget, ticket: PerformTicket) {
        self.targets.push(target);
        self.tickets.push(ticket);
    }

    /// Waits for every endpoint action and returns the outcomes, grouped by
    /// target in start order.
    pub async fn outcomes(self) -> Vec<Vec<(String, EndpointOutcome)>> {
        let mut all = Vec::with_capacity(self.tickets.len());
        for ticket in self.tickets {
            all.push(ticket.outcomes().await);
        }
        all
    }
}

/// Owns the match state and turns events into media actions.
pub struct Orchestrator {
    endpoints: Vec<Arc<ControlEndpoint>>,
    executor: ActionExecutor,
    scenes: SceneConfig,
    timing: TimingConfig,
    state: RwLock<MatchState>,
    persistence: Arc<dyn MatchStatePersistence>,
}

impl Orchestrator {
    pub fn new(
        endpoints: Vec<Arc<ControlEndpoint>>,
        executor: ActionExecutor,
        scenes: SceneConfig,
        timing: TimingConfig,
        state: MatchState,
        persistence: Arc<dyn MatchStatePersistence>,
    ) -> Self {
        Self {
            endpoints,
            executor,
            scenes,
            timing,
            state: RwLock::new(state),
            persistence,
        }
    }

    pub fn endpoints(&self) -> &[Arc<ControlEndpoint>] {
        &self.endpoints
    }

    /// Subscribes the orchestrator to its domain events.
    pub fn subscribe(self: &Arc<Self>, router: &EventRouter) {
        let this = Arc::clone(self);
        router.subscribe_one(
            "game",
            "match_ended",
            Callback::sync(move |data| {
                this.handle_match_ended(data);
                Ok(())
            }),
        );

        let this = Arc::clone(self);
        router.subscribe_one(
            "game",
            "goal_scored",
            Callback::sync(move |_| {
                this.handle_goal_scored();
                Ok(())
            }),
        );
    }

    /// Plays the win media for `winner_team_num` in the payload.
    pub fn handle_match_ended(&self, data: &Value) -> Playback {
        let Some(team_num) = data.get("winner_team_num").and_then(Value::as_i64) else {
            log::warn!("[Orchestrator] match_ended without winner_team_num: {}", data);
            return Playback::default();
        };
        self.trigger_win(team_num).unwrap_or_else(|e| {
            log::error!("[Orchestrator] {}", e);
            Playback::default()
        })
    }

    /// Plays the goal video and goal audio.
    pub fn handle_goal_scored(&self) -> Playback {
        log::info!("[Orchestrator] Goal scored");
        let mut playback = Playback::default();
        self.play_goal_video(&mut playback);
        self.play_goal_audio(&mut playback);
        playback
    }

    /// Plays the win video of the current match's blue (0) or orange team,
    /// followed by the win audio.
    pub fn trigger_win(&self, team_num: i64) -> StingerResult<Playback> {
        let (index, pairing) = self.current_match()?;
        let video = if team_num == 0 {
            log::info!("[Orchestrator] Blue team wins match {}", index + 1);
            win_video_name(&pairing.blue_team, "BLAU")
        } else {
            log::info!("[Orchestrator] Orange team wins match {}", index + 1);
            win_video_name(&pairing.orange_team, "PINK")
        };

        let mut playback = self.play_video(&video);
        let audio = self.play_audio();
        playback.targets.extend(audio.targets);
        playback.tickets.extend(audio.tickets);
        Ok(playback)
    }

    /// Plays a win video by source name.
    pub fn play_video(&self, video: &str) -> Playback {
        let mut playback = Playback::default();
        self.play(
            &mut playback,
            &self.scenes.win_scene,
            video,
            self.timing.hide_video(),
        );
        playback
    }

    /// Plays the win stinger audio.
    pub fn play_audio(&self) -> Playback {
        let mut playback = Playback::default();
        self.play(
            &mut playback,
            &self.scenes.audio_scene,
            &self.scenes.audio_source,
            self.timing.hide_audio(),
        );
        playback
    }

    fn play_goal_video(&self, playback: &mut Playback) {
        self.play(
            playback,
            &self.scenes.goal_video_scene,
            &self.scenes.goal_video_source,
            self.timing.hide_video(),
        );
    }

    fn play_goal_audio(&self, playback: &mut Playback) {
        self.play(
            playback,
            &self.scenes.audio_scene,
            &self.scenes.goal_audio_source,
            self.timing.hide_audio(),
        );
    }

    /// Plays the matchup animation of the current match and its audio (the
    /// finale audio for the final match).
    pub fn play_matchup(&self) -> StingerResult<Playback> {
        let (index, pairing) = self.current_match()?;
        let video = matchup_video_name(&pairing);
        let audio = if index == FINALE_MATCH_INDEX {
            &self.scenes.matchup_audio_finale_source
        } else {
            &self.scenes.matchup_audio_source
        };
        log::info!("[Orchestrator] Matchup for match {}: {}", index + 1, video);

        let mut playback = Playback::default();
        self.play(
            &mut playback,
            &self.scenes.matchup_scene,
            &video,
            self.timing.hide_matchup(),
        );
        self.play(
            &mut playback,
            &self.scenes.audio_scene,
            audio,
            self.timing.hide_audio(),
        );
        Ok(playback)
    }

    /// Hides every item in the matchup scene right away.
    pub async fn hide_matchup(&self) -> usize {
        if self.scenes.matchup_scene.is_empty() {
            log::error!("[Orchestrator] Matchup scene is not configured");
            return 0;
        }
        self.executor
            .hide_all(&self.scenes.matchup_scene, &self.endpoints)
            .await
    }

    /// Selects the match on air and persists the choice.
    ///
    /// Out-of-range indices are rejected and change nothing.
    pub fn set_current_match(&self, index: usize) -> StingerResult<MatchPairing> {
        let pairing = self.state.write().select(index)?.clone();
        log::info!(
            "[Orchestrator] Current match set to {} ({} vs {})",
            index + 1,
            pairing.blue_team,
            pairing.orange_team
        );
        if let Err(e) = self.persistence.save_current_match(index) {
            log::error!("[Orchestrator] Failed to persist current match: {}", e);
        }
        Ok(pairing)
    }

    /// Index and pairing of the match on air.
    pub fn current_match(&self) -> StingerResult<(usize, MatchPairing)> {
        let state = self.state.read();
        state
            .current()
            .map(|pairing| (state.current_index(), pairing.clone()))
            .ok_or_else(|| StingerError::Configuration("match schedule is empty".into()))
    }

    /// The whole schedule and the index of the match on air.
    pub fn matches(&self) -> (Vec<MatchPairing>, usize) {
        let state = self.state.read();
        (state.matches().to_vec(), state.current_index())
    }

    /// Logs endpoints that gave up reconnecting until `cancel` fires.
    pub async fn watch_endpoint_failures(
        &self,
        mut events: broadcast::Receiver<BroadcastEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(BroadcastEvent::Endpoint(EndpointEvent::ConnectionFailed {
                    endpoint,
                    attempts,
                    ..
                })) => {
                    log::error!(
                        "[Orchestrator] {} unreachable after {} attempt(s); its media will not play",
                        endpoint,
                        attempts
                    );
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("[Orchestrator] Missed {} notification(s)", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    fn play(&self, playback: &mut Playback, scene: &str, source: &str, delay: Duration) {
        if scene.is_empty() || source.is_empty() {
            log::error!(
                "[Orchestrator] Scene or source not configured (scene '{}', source '{}')",
                scene,
                source
            );
            return;
        }
        let target = MediaTarget::new(scene, source);
        let ticket = self.executor.perform(&target, &self.endpoints, delay);
        playback.push(target, ticket);
    }
}
