//! Event system for endpoint and action notifications.
//!
//! This module provides:
//! - [`EventEmitter`] trait for services to report what happened
//! - [`BroadcastEventBridge`] for fanning events out to watchers
//! - Event types for endpoint health and playback actions
//!
//! These are operator-facing notifications. Match events routed from the
//! event source go through [`crate::router::EventRouter`] instead.

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::endpoint::{ConnectionState, EndpointRole};

/// Events broadcast to watchers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Endpoint connection lifecycle.
    Endpoint(EndpointEvent),

    /// Playback actions against control endpoints.
    Action(ActionEvent),
}

/// Events related to endpoint connection state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EndpointEvent {
    /// The endpoint moved to a new connection state.
    StateChanged {
        endpoint: String,
        role: EndpointRole,
        state: ConnectionState,
        timestamp: u64,
    },
    /// A finite retry budget was exhausted; the endpoint will not connect.
    ConnectionFailed {
        endpoint: String,
        role: EndpointRole,
        attempts: u32,
        timestamp: u64,
    },
}

/// Events related to reveal/revert actions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActionEvent {
    /// A media source was made visible and restarted.
    Revealed {
        endpoint: String,
        scene: String,
        source: String,
        timestamp: u64,
    },
    /// A media source was hidden again after its delay.
    Reverted {
        endpoint: String,
        scene: String,
        source: String,
        timestamp: u64,
    },
}
