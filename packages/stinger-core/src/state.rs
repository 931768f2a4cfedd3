//! Core configuration and match state types.
//!
//! [`Config`] is the runtime configuration of the core library; the server
//! binary builds it from its flat YAML file. [`MatchState`] holds the match
//! schedule and which match is on air.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::endpoint::{EndpointConfig, EndpointRole, RetryPolicy};
use crate::error::StingerError;
use crate::protocol_constants::{DEFAULT_COMMAND_PORT, DEFAULT_EVENT_SOURCE_PORT, DEFAULT_OBS_PORT};

/// Scene and source names used by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub win_scene: String,
    pub matchup_scene: String,
    pub audio_scene: String,
    /// Win stinger audio (in `audio_scene`).
    pub audio_source: String,
    pub matchup_audio_source: String,
    /// Matchup audio used for the final match.
    pub matchup_audio_finale_source: String,
    pub goal_video_scene: String,
    pub goal_video_source: String,
    /// Goal audio (in `audio_scene`).
    pub goal_audio_source: String,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            win_scene: "SCN Win Animation".into(),
            matchup_scene: "SCN Matchup Animation".into(),
            audio_scene: "SCN Musik-Output".into(),
            audio_source: "MED Game Win Stinger Audio".into(),
            matchup_audio_source: "MED Matchup Audio".into(),
            matchup_audio_finale_source: "MED Matchup Audio Finale".into(),
            goal_video_scene: "SCN Goal Video".into(),
            goal_video_source: "MED Goal Video".into(),
            goal_audio_source: "MED Goal Audio".into(),
        }
    }
}

/// Retry, health-check and reveal timings (seconds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait between connection attempts.
    pub retry_delay_secs: u64,
    /// Connection attempts before giving up (0 = never give up).
    pub max_retry_attempts: u32,
    /// Interval between control endpoint liveness probes.
    pub health_check_interval_secs: u64,
    /// How long win and goal videos stay visible.
    pub hide_video_secs: u64,
    /// How long the matchup video stays visible.
    pub hide_matchup_secs: u64,
    /// How long audio sources stay enabled.
    pub hide_audio_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: 5,
            max_retry_attempts: 0,
            health_check_interval_secs: 5,
            hide_video_secs: 10,
            hide_matchup_secs: 70,
            hide_audio_secs: 5,
        }
    }
}

impl TimingConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            delay: Duration::from_secs(self.retry_delay_secs),
            max_attempts: self.max_retry_attempts,
        }
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn hide_video(&self) -> Duration {
        Duration::from_secs(self.hide_video_secs)
    }

    pub fn hide_matchup(&self) -> Duration {
        Duration::from_secs(self.hide_matchup_secs)
    }

    pub fn hide_audio(&self) -> Duration {
        Duration::from_secs(self.hide_audio_secs)
    }
}

/// Side-channel command server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandServerConfig {
    pub enabled: bool,
    pub bind_host: String,
    pub port: u16,
}

impl Default for CommandServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_host: "127.0.0.1".into(),
            port: DEFAULT_COMMAND_PORT,
        }
    }
}

/// Blue vs orange pairing of one scheduled match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPairing {
    pub blue_team: String,
    pub orange_team: String,
}

impl MatchPairing {
    pub fn new(blue_team: impl Into<String>, orange_team: impl Into<String>) -> Self {
        Self {
            blue_team: blue_team.into(),
            orange_team: orange_team.into(),
        }
    }
}

/// Default seven-match schedule.
pub fn default_matches() -> Vec<MatchPairing> {
    [
        ("HSMW", "UIA B"),
        ("TLU", "WHZ"),
        ("LES", "UIA B"),
        ("TLU", "UIA A"),
        ("HSMW", "LES"),
        ("UIA A", "WHZ"),
        ("HSMW", "HSMW"),
    ]
    .into_iter()
    .map(|(blue, orange)| MatchPairing::new(blue, orange))
    .collect()
}

/// The match schedule and the index of the match on air.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchState {
    matches: Vec<MatchPairing>,
    current: usize,
}

impl MatchState {
    /// Creates the state, clamping an out-of-range index to the first match.
    pub fn new(matches: Vec<MatchPairing>, current: usize) -> Self {
        let current = if current < matches.len() { current } else { 0 };
        Self { matches, current }
    }

    pub fn matches(&self) -> &[MatchPairing] {
        &self.matches
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// The match on air, if the schedule is not empty.
    pub fn current(&self) -> Option<&MatchPairing> {
        self.matches.get(self.current)
    }

    /// Selects a match. Out-of-range indices are rejected and change nothing.
    pub fn select(&mut self, index: usize) -> Result<&MatchPairing, StingerError> {
        if index >= self.matches.len() {
            return Err(StingerError::InvalidRequest(format!(
                "Invalid 'match_index'. Must be between 0 and {}",
                self.matches.len().saturating_sub(1)
            )));
        }
        self.current = index;
        Ok(&self.matches[index])
    }
}

/// Configuration for the Stinger core.
///
/// All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OBS instances receiving media commands.
    pub control_endpoints: Vec<EndpointConfig>,
    /// The match-event relay.
    pub event_source: EndpointConfig,
    pub command_server: CommandServerConfig,
    pub scenes: SceneConfig,
    pub timing: TimingConfig,
    pub matches: Vec<MatchPairing>,
    /// Index into `matches` of the match on air.
    pub current_match: usize,
    /// Log every dispatched event.
    pub debug_events: bool,
    /// `channel:event` names excluded from debug logging.
    pub debug_filters: HashSet<String>,
    /// Capacity of the notification broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            control_endpoints: vec![
                EndpointConfig::new("obs-1", "localhost", DEFAULT_OBS_PORT, EndpointRole::Control),
                EndpointConfig::new("obs-2", "localhost", DEFAULT_OBS_PORT, EndpointRole::Control),
            ],
            event_source: EndpointConfig::new(
                "sos",
                "localhost",
                DEFAULT_EVENT_SOURCE_PORT,
                EndpointRole::EventSource,
            ),
            command_server: CommandServerConfig::default(),
            scenes: SceneConfig::default(),
            timing: TimingConfig::default(),
            matches: default_matches(),
            current_match: 0,
            debug_events: false,
            debug_filters: HashSet::new(),
            event_channel_capacity: 100,
        }
    }
}

impl Config {
    /// Checks the settings every endpoint depends on.
    ///
    /// Endpoint addresses are not checked here: a bad endpoint only blocks
    /// its own startup (see [`EndpointConfig::validate`]).
    pub fn validate(&self) -> Result<(), StingerError> {
        if self.control_endpoints.is_empty() {
            return Err(StingerError::Configuration(
                "at least one control endpoint is required".into(),
            ));
        }

        if self.matches.is_empty() {
            return Err(StingerError::Configuration("match schedule is empty".into()));
        }
        if self.current_match >= self.matches.len() {
            return Err(StingerError::Configuration(format!(
                "current_match {} is out of range (0..{})",
                self.current_match,
                self.matches.len()
            )));
        }
        if self.command_server.enabled && self.command_server.port == 0 {
            return Err(StingerError::Configuration(
                "command_server.port must be non-zero".into(),
            ));
        }
        if self.timing.health_check_interval_secs == 0 {
            return Err(StingerError::Configuration(
                "health_check_interval_secs must be >= 1".into(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(StingerError::Configuration(
                "event_channel_capacity must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.matches.len(), 7);
        assert_eq!(config.timing.retry_policy(), RetryPolicy::default());
        assert_eq!(config.timing.hide_matchup(), Duration::from_secs(70));
    }

    #[test]
    fn validate_rejects_bad_schedule_but_not_bad_endpoints() {
        let mut config = Config::default();
        config.event_source.host.clear();
        config.control_endpoints[1].port = 0;
        config.validate().unwrap();

        let mut config = Config::default();
        config.current_match = 7;
        assert!(matches!(config.validate(), Err(StingerError::Configuration(_))));

        let mut config = Config::default();
        config.control_endpoints.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn select_rejects_out_of_range_without_change() {
        let mut state = MatchState::new(default_matches(), 2);

        let err = state.select(7).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid request: Invalid 'match_index'. Must be between 0 and 6"
        );
        assert_eq!(state.current_index(), 2);

        let pairing = state.select(5).unwrap().clone();
        assert_eq!(pairing, MatchPairing::new("UIA A", "WHZ"));
        assert_eq!(state.current_index(), 5);
    }

    #[test]
    fn out_of_range_initial_index_falls_back_to_first() {
        let state = MatchState::new(default_matches(), 42);
        assert_eq!(state.current_index(), 0);
        assert!(MatchState::new(Vec::new(), 0).current().is_none());
    }
}
