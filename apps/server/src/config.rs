//! Server configuration.
//!
//! A flat YAML document merged over defaults, then environment overrides.
//! The selected match is written back to the same file when it changes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use stinger_core::protocol_constants::{DEFAULT_EVENT_SOURCE_PORT, DEFAULT_OBS_PORT};
use stinger_core::state::CommandServerConfig;
use stinger_core::{
    EndpointConfig, EndpointRole, MatchPairing, MatchStatePersistence, SceneConfig, StingerError,
    StingerResult, TimingConfig,
};

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Override: `STINGER_OBS_HOST`
    pub obs_host: String,
    /// Override: `STINGER_OBS_PORT`
    pub obs_port: u16,
    /// Empty means no authentication.
    /// Override: `STINGER_OBS_PASSWORD`
    pub obs_password: String,

    /// Second OBS instance (e.g. the stream PC next to the production PC).
    pub obs2_enabled: bool,
    /// Override: `STINGER_OBS2_HOST`
    pub obs2_host: String,
    /// Override: `STINGER_OBS2_PORT`
    pub obs2_port: u16,
    /// Override: `STINGER_OBS2_PASSWORD`
    pub obs2_password: String,

    /// Override: `STINGER_SOS_HOST`
    pub sos_host: String,
    /// Override: `STINGER_SOS_PORT`
    pub sos_port: u16,

    #[serde(flatten)]
    pub scenes: SceneConfig,
    #[serde(flatten)]
    pub timing: TimingConfig,

    pub matches: Vec<MatchPairing>,
    pub current_match: usize,

    /// Override: `STINGER_COMPANION_ENABLED`
    pub companion_enabled: bool,
    pub companion_host: String,
    /// Override: `STINGER_COMPANION_PORT`
    pub companion_port: u16,

    pub debug_events: bool,
    /// `channel:event` names left out of debug logging.
    pub debug_filters: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = stinger_core::Config::default();
        let commands = CommandServerConfig::default();
        Self {
            obs_host: "localhost".into(),
            obs_port: DEFAULT_OBS_PORT,
            obs_password: String::new(),
            obs2_enabled: true,
            obs2_host: "localhost".into(),
            obs2_port: DEFAULT_OBS_PORT,
            obs2_password: String::new(),
            sos_host: "localhost".into(),
            sos_port: DEFAULT_EVENT_SOURCE_PORT,
            scenes: core.scenes,
            timing: core.timing,
            matches: core.matches,
            current_match: core.current_match,
            companion_enabled: commands.enabled,
            companion_host: commands.bind_host,
            companion_port: commands.port,
            debug_events: false,
            debug_filters: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    ///
    /// A path that does not exist yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            Some(path) => {
                log::info!(
                    "Config file {} not found, using defaults",
                    path.display()
                );
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `STINGER_*` overrides; unparsable values are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let parsed = |key: &str| lookup(key).and_then(|v| v.parse().ok());

        if let Some(host) = lookup("STINGER_OBS_HOST") {
            self.obs_host = host;
        }
        if let Some(port) = parsed("STINGER_OBS_PORT") {
            self.obs_port = port;
        }
        if let Some(password) = lookup("STINGER_OBS_PASSWORD") {
            self.obs_password = password;
        }
        if let Some(host) = lookup("STINGER_OBS2_HOST") {
            self.obs2_host = host;
        }
        if let Some(port) = parsed("STINGER_OBS2_PORT") {
            self.obs2_port = port;
        }
        if let Some(password) = lookup("STINGER_OBS2_PASSWORD") {
            self.obs2_password = password;
        }
        if let Some(host) = lookup("STINGER_SOS_HOST") {
            self.sos_host = host;
        }
        if let Some(port) = parsed("STINGER_SOS_PORT") {
            self.sos_port = port;
        }
        if let Some(enabled) = lookup("STINGER_COMPANION_ENABLED").and_then(|v| v.parse().ok()) {
            self.companion_enabled = enabled;
        }
        if let Some(port) = parsed("STINGER_COMPANION_PORT") {
            self.companion_port = port;
        }
    }

    /// Converts to stinger-core's Config type.
    pub fn to_core_config(&self) -> stinger_core::Config {
        let mut control_endpoints = vec![EndpointConfig::new(
            "obs-1",
            self.obs_host.clone(),
            self.obs_port,
            EndpointRole::Control,
        )
        .with_password(self.obs_password.clone())];
        if self.obs2_enabled {
            control_endpoints.push(
                EndpointConfig::new(
                    "obs-2",
                    self.obs2_host.clone(),
                    self.obs2_port,
                    EndpointRole::Control,
                )
                .with_password(self.obs2_password.clone()),
            );
        }

        stinger_core::Config {
            control_endpoints,
            event_source: EndpointConfig::new(
                "sos",
                self.sos_host.clone(),
                self.sos_port,
                EndpointRole::EventSource,
            ),
            command_server: CommandServerConfig {
                enabled: self.companion_enabled,
                bind_host: self.companion_host.clone(),
                port: self.companion_port,
            },
            scenes: self.scenes.clone(),
            timing: self.timing.clone(),
            matches: self.matches.clone(),
            current_match: self.current_match,
            debug_events: self.debug_events,
            debug_filters: self.debug_filters.iter().cloned().collect::<HashSet<_>>(),
            ..Default::default()
        }
    }
}

/// Writes the selected match back into the YAML config file.
///
/// Only the `current_match` key is touched; everything else in the file is
/// kept as written.
pub struct YamlMatchStatePersistence {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl YamlMatchStatePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn read_document(&self) -> StingerResult<Mapping> {
        if !self.path.exists() {
            return Ok(Mapping::new());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| self.error("read", e))?;
        match serde_yaml::from_str::<Value>(&content).map_err(|e| self.error("parse", e))? {
            Value::Mapping(mapping) => Ok(mapping),
            Value::Null => Ok(Mapping::new()),
            _ => Err(StingerError::Internal(format!(
                "{} is not a YAML mapping",
                self.path.display()
            ))),
        }
    }

    fn error(&self, action: &str, e: impl std::fmt::Display) -> StingerError {
        StingerError::Internal(format!(
            "Failed to {} {}: {}",
            action,
            self.path.display(),
            e
        ))
    }
}

impl MatchStatePersistence for YamlMatchStatePersistence {
    fn save_current_match(&self, index: usize) -> StingerResult<()> {
        let _guard = self.write_lock.lock();

        let mut document = self.read_document()?;
        document.insert(
            Value::String("current_match".into()),
            Value::Number((index as u64).into()),
        );

        let content =
            serde_yaml::to_string(&Value::Mapping(document)).map_err(|e| self.error("encode", e))?;
        std::fs::write(&self.path, content).map_err(|e| self.error("write", e))?;
        log::debug!("Saved current_match={} to {}", index, self.path.display());
        Ok(())
    }
}
