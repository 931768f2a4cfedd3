//! Domain services.

pub mod orchestrator;

pub use orchestrator::{
    matchup_video_name, normalize_team_name, team_label, win_video_name, MatchStatePersistence,
    NoopMatchStatePersistence, Orchestrator, Playback,
};
