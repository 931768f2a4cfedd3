//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, so the supervisor and executor can be tested without watchers.

use super::{ActionEvent, EndpointEvent};

/// Trait for emitting notifications without knowledge of who listens.
pub trait EventEmitter: Send + Sync {
    /// Emits an endpoint lifecycle event.
    fn emit_endpoint(&self, event: EndpointEvent);

    /// Emits a playback action event.
    fn emit_action(&self, event: ActionEvent);
}

/// No-op emitter for tests or embedded use.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_endpoint(&self, _event: EndpointEvent) {}

    fn emit_action(&self, _event: ActionEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_endpoint(&self, event: EndpointEvent) {
        tracing::debug!(?event, "endpoint_event");
    }

    fn emit_action(&self, event: ActionEvent) {
        tracing::debug!(?event, "action_event");
    }
}
