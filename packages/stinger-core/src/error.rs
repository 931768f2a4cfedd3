//! Centralized error types for the Stinger core library.
//!
//! Each concern owns a small `thiserror` enum; [`StingerError`] folds them
//! into one application-wide type for bootstrap and API callers.

use serde::Serialize;
use thiserror::Error;

pub use crate::control::ControlError;
pub use crate::endpoint::ConnectionError;
pub use crate::router::{ProtocolError, RouterError};

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

impl ErrorCode for ConnectionError {
    fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport_failed",
            Self::Cancelled => "connection_cancelled",
            Self::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}

impl ErrorCode for ControlError {
    fn code(&self) -> &'static str {
        match self {
            Self::RequestFailed { .. } => "request_failed",
            Self::Timeout(_) => "request_timeout",
            Self::Transport(_) => "transport_failed",
            Self::Handshake(_) => "handshake_failed",
            Self::AuthenticationRequired => "authentication_required",
        }
    }
}

impl ErrorCode for ProtocolError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::MissingEvent => "missing_event",
            Self::MissingSeparator(_) => "missing_separator",
        }
    }
}

impl ErrorCode for RouterError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::Encode(_) => "encode_failed",
        }
    }
}

/// Application-wide error type.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum StingerError {
    /// Connection to an endpoint could not be established.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A control endpoint rejected or failed an action.
    #[error("Control failed: {0}")]
    Control(String),

    /// Inbound message could not be decoded.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Required configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StingerError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection_error",
            Self::Control(_) => "control_error",
            Self::Protocol(_) => "protocol_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type StingerResult<T> = Result<T, StingerError>;

impl From<ConnectionError> for StingerError {
    fn from(err: ConnectionError) -> Self {
        Self::Connection(err.to_string())
    }
}

impl From<ControlError> for StingerError {
    fn from(err: ControlError) -> Self {
        Self::Control(err.to_string())
    }
}

impl From<ProtocolError> for StingerError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<RouterError> for StingerError {
    fn from(err: RouterError) -> Self {
        Self::Connection(err.to_string())
    }
}
