//! General utilities shared across the library.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Builds a plain `ws://` URL for a host and port.
///
/// IPv6 literals are wrapped in brackets.
#[must_use]
pub fn ws_url(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("ws://[{}]:{}", host, port)
    } else {
        format!("ws://{}:{}", host, port)
    }
}
