//! Endpoint connections and their supervision.
//!
//! An endpoint is one remote peer the process keeps a persistent connection
//! to: either a control surface (OBS) or the match-event source. This module
//! holds the shared types; [`supervisor`] drives connects, retries and health
//! probing.

pub mod retry;
pub mod supervisor;

use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::error::StingerError;
use crate::events::{EndpointEvent, EventEmitter};
use crate::utils::{now_millis, ws_url};

pub use retry::RetryPolicy;
pub use supervisor::ConnectionSupervisor;

/// Errors raised while establishing a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The transport could not be opened (refused, closed, timed out, handshake).
    #[error("transport error: {0}")]
    Transport(String),

    /// Shutdown was requested while connecting.
    #[error("connection attempt cancelled")]
    Cancelled,

    /// A finite retry budget was spent without success.
    #[error("gave up after {attempts} attempt(s)")]
    RetriesExhausted { attempts: u32 },
}

/// What kind of peer an endpoint talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndpointRole {
    /// Receives show/trigger/hide commands.
    Control,
    /// Pushes domain notifications.
    EventSource,
}

/// Address and credential of a single endpoint.
///
/// Immutable once a connection starts; changing it means tearing the
/// connection down and building a new handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Human-readable name used in logs (e.g. `obs-1`).
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Optional password. Empty strings are treated as absent.
    #[serde(default)]
    pub password: Option<String>,
    pub role: EndpointRole,
}

impl EndpointConfig {
    /// Creates a config without a password.
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16, role: EndpointRole) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            password: None,
            role,
        }
    }

    /// Sets the password; empty strings clear it.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.password = if password.is_empty() { None } else { Some(password) };
        self
    }

    /// Returns the `ws://host:port` URL of this endpoint.
    pub fn url(&self) -> String {
        ws_url(&self.host, self.port)
    }

    /// Checks that the endpoint can be connected to at all.
    pub fn validate(&self) -> Result<(), StingerError> {
        let mut missing = Vec::new();
        if self.host.trim().is_empty() {
            missing.push("host");
        }
        if self.port == 0 {
            missing.push("port");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(StingerError::Configuration(format!(
                "endpoint '{}' is missing {}",
                self.name,
                missing.join(", ")
            )))
        }
    }
}

/// Connection health of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// A health probe failed; a reconnect is about to start.
    Degraded,
    /// The endpoint gave up (retry budget exhausted) or was shut down.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Degraded => "degraded",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Identity and health of one endpoint.
///
/// The transport itself is owned by the role-specific wrapper
/// ([`crate::control::ControlEndpoint`] or [`crate::source::EventSourceClient`]);
/// this handle only tracks state and reports transitions.
pub struct EndpointHandle {
    config: EndpointConfig,
    state: RwLock<ConnectionState>,
    emitter: Arc<dyn EventEmitter>,
}

impl EndpointHandle {
    /// Creates a handle in the `Disconnected` state.
    pub fn new(config: EndpointConfig, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            config,
            state: RwLock::new(ConnectionState::Disconnected),
            emitter,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn role(&self) -> EndpointRole {
        self.config.role
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Moves to `state`, emitting a notification when it actually changes.
    pub fn set_state(&self, state: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous == state {
            return;
        }
        log::debug!(
            "[Endpoint] {} state: {} -> {}",
            self.config.name,
            previous,
            state
        );
        self.emitter.emit_endpoint(EndpointEvent::StateChanged {
            endpoint: self.config.name.clone(),
            role: self.config.role,
            state,
            timestamp: now_millis(),
        });
    }

    /// Reports that this endpoint will never connect.
    pub(crate) fn report_failure(&self, attempts: u32) {
        self.emitter.emit_endpoint(EndpointEvent::ConnectionFailed {
            endpoint: self.config.name.clone(),
            role: self.config.role,
            attempts,
            timestamp: now_millis(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BroadcastEvent, BroadcastEventBridge, NoopEventEmitter};

    #[test]
    fn empty_password_is_treated_as_absent() {
        let config = EndpointConfig::new("obs-1", "localhost", 4455, EndpointRole::Control)
            .with_password("");
        assert!(config.password.is_none());

        let config = config.with_password("secret");
        assert_eq!(config.password.as_deref(), Some("secret"));
    }

    #[test]
    fn validate_reports_missing_fields() {
        let config = EndpointConfig::new("obs-2", " ", 0, EndpointRole::Control);
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: endpoint 'obs-2' is missing host, port"
        );

        let ok = EndpointConfig::new("sos", "10.0.0.5", 49322, EndpointRole::EventSource);
        assert!(ok.validate().is_ok());
        assert_eq!(ok.url(), "ws://10.0.0.5:49322");
    }

    #[test]
    fn handle_starts_disconnected() {
        let handle = EndpointHandle::new(
            EndpointConfig::new("obs-1", "localhost", 4455, EndpointRole::Control),
            Arc::new(NoopEventEmitter),
        );
        assert_eq!(handle.state(), ConnectionState::Disconnected);
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn state_changes_are_emitted_once() {
        let bridge = BroadcastEventBridge::new(8);
        let mut rx = bridge.subscribe();
        let handle = EndpointHandle::new(
            EndpointConfig::new("obs-1", "localhost", 4455, EndpointRole::Control),
            Arc::new(bridge),
        );

        handle.set_state(ConnectionState::Connecting);
        handle.set_state(ConnectionState::Connecting);
        handle.set_state(ConnectionState::Connected);

        let mut states = Vec::new();
        while let Ok(BroadcastEvent::Endpoint(EndpointEvent::StateChanged { state, .. })) =
            rx.try_recv()
        {
            states.push(state);
        }
        assert_eq!(
            states,
            vec![ConnectionState::Connecting, ConnectionState::Connected]
        );
    }
}
