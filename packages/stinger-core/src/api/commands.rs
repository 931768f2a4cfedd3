//! Side-channel command protocol.
//!
//! One JSON object per message, e.g. `{"command": "set_match", "match_index": 2}`.
//! Every command gets exactly one response: `{"status": "success", "command": …}`
//! plus command-specific fields, or `{"status": "error", "message": …}`.

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::protocol_constants::VALID_COMMANDS;
use crate::services::{team_label, win_video_name, Orchestrator};
use crate::state::MatchPairing;

/// Why a command produced an error response.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Invalid JSON")]
    InvalidJson,

    #[error("Unknown command: {0}. Valid commands: {list}", list = VALID_COMMANDS.join(", "))]
    Unknown(String),

    #[error("Missing 'team' or 'color' parameter")]
    MissingTeamOrColor,

    #[error("Missing 'team_num' parameter (0=blue, 1=orange)")]
    MissingTeamNum,

    #[error("Invalid 'match_index'. Must be between 0 and {max}")]
    InvalidMatchIndex { max: usize },

    #[error("{0}")]
    Failed(String),
}

/// A decoded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    PlayMatchup,
    PlayVideo { team: String, color: String },
    PlayAudio,
    TriggerWin { team_num: i64 },
    SetMatch { match_index: Option<u64> },
    GetCurrentMatch,
    ListMatches,
    HideMatchup,
}

impl Command {
    /// Parses a raw message. Command names are case-insensitive.
    pub fn parse(raw: &str) -> Result<Self, CommandError> {
        let value: Value = serde_json::from_str(raw).map_err(|_| CommandError::InvalidJson)?;
        let name = value
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        match name.as_str() {
            "play_matchup" => Ok(Self::PlayMatchup),
            "play_video" => match (text("team"), text("color")) {
                (Some(team), Some(color)) => Ok(Self::PlayVideo { team, color }),
                _ => Err(CommandError::MissingTeamOrColor),
            },
            "play_audio" => Ok(Self::PlayAudio),
            "trigger_win" => value
                .get("team_num")
                .and_then(Value::as_i64)
                .map(|team_num| Self::TriggerWin { team_num })
                .ok_or(CommandError::MissingTeamNum),
            "set_match" => Ok(Self::SetMatch {
                match_index: value.get("match_index").and_then(Value::as_u64),
            }),
            "get_current_match" => Ok(Self::GetCurrentMatch),
            "list_matches" => Ok(Self::ListMatches),
            "hide_matchup" => Ok(Self::HideMatchup),
            _ => Err(CommandError::Unknown(name)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PlayMatchup => "play_matchup",
            Self::PlayVideo { .. } => "play_video",
            Self::PlayAudio => "play_audio",
            Self::TriggerWin { .. } => "trigger_win",
            Self::SetMatch { .. } => "set_match",
            Self::GetCurrentMatch => "get_current_match",
            Self::ListMatches => "list_matches",
            Self::HideMatchup => "hide_matchup",
        }
    }
}

#[derive(Serialize)]
struct MatchInfo<'a> {
    match_index: usize,
    match_number: usize,
    blue_team: &'a str,
    orange_team: &'a str,
}

impl<'a> MatchInfo<'a> {
    fn new(index: usize, pairing: &'a MatchPairing) -> Self {
        Self {
            match_index: index,
            match_number: index + 1,
            blue_team: &pairing.blue_team,
            orange_team: &pairing.orange_team,
        }
    }
}

/// Runs a command and returns the command-specific response fields.
///
/// Playback is started, not awaited.
pub async fn execute(orchestrator: &Orchestrator, command: &Command) -> Result<Value, CommandError> {
    let failed = |e: crate::error::StingerError| CommandError::Failed(e.to_string());

    match command {
        Command::PlayMatchup => {
            orchestrator.play_matchup().map_err(failed)?;
            Ok(json!({ "message": "Matchup video started" }))
        }
        Command::PlayVideo { team, color } => {
            let video = win_video_name(team, color);
            orchestrator.play_video(&video);
            Ok(json!({ "video": video }))
        }
        Command::PlayAudio => {
            orchestrator.play_audio();
            Ok(json!({ "message": "Audio started" }))
        }
        Command::TriggerWin { team_num } => {
            orchestrator.trigger_win(*team_num).map_err(failed)?;
            Ok(json!({ "team": team_label(*team_num) }))
        }
        Command::SetMatch { match_index } => {
            let (matches, _) = orchestrator.matches();
            let invalid = CommandError::InvalidMatchIndex {
                max: matches.len().saturating_sub(1),
            };
            let index = match_index
                .and_then(|i| usize::try_from(i).ok())
                .ok_or(invalid)?;
            let pairing = orchestrator.set_current_match(index).map_err(|_| {
                CommandError::InvalidMatchIndex {
                    max: matches.len().saturating_sub(1),
                }
            })?;
            serde_json::to_value(MatchInfo::new(index, &pairing))
                .map_err(|e| CommandError::Failed(e.to_string()))
        }
        Command::GetCurrentMatch => {
            let (index, pairing) = orchestrator.current_match().map_err(failed)?;
            serde_json::to_value(MatchInfo::new(index, &pairing))
                .map_err(|e| CommandError::Failed(e.to_string()))
        }
        Command::ListMatches => {
            let (matches, current) = orchestrator.matches();
            let list: Vec<MatchInfo<'_>> = matches
                .iter()
                .enumerate()
                .map(|(i, pairing)| MatchInfo::new(i, pairing))
                .collect();
            Ok(json!({ "matches": list, "current_match_index": current }))
        }
        Command::HideMatchup => {
            orchestrator.hide_matchup().await;
            Ok(json!({ "message": "Matchup video hidden on all OBS instances" }))
        }
    }
}

/// Parses, runs and answers one raw command message.
pub async fn respond(orchestrator: &Orchestrator, raw: &str) -> Value {
    let result = match Command::parse(raw) {
        Ok(command) => execute(orchestrator, &command)
            .await
            .map(|fields| success(command.name(), fields)),
        Err(e) => Err(e),
    };

    result.unwrap_or_else(|e| {
        log::warn!("[Commands] {}", e);
        json!({ "status": "error", "message": e.to_string() })
    })
}

fn success(command: &str, fields: Value) -> Value {
    let mut body = Map::new();
    body.insert("status".into(), Value::from("success"));
    body.insert("command".into(), Value::from(command));
    if let Value::Object(fields) = fields {
        body.extend(fields);
    }
    Value::Object(body)
}
