//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the event relay and obs-websocket protocols,
//! and changing them would break interoperability.

// ─────────────────────────────────────────────────────────────────────────────
// Event relay
// ─────────────────────────────────────────────────────────────────────────────

/// Separator between channel and event name in `channel:event` strings.
pub const CHANNEL_EVENT_SEPARATOR: char = ':';

/// Channel used for remote subscription registration.
pub const RELAY_CHANNEL: &str = "wsRelay";

/// Event name used for remote subscription registration.
pub const RELAY_REGISTER_EVENT: &str = "register";

/// Channel that never touches the network.
pub const LOCAL_CHANNEL: &str = "local";

/// Channel carrying connection lifecycle notifications (`open`, `close`, `error`).
pub const LIFECYCLE_CHANNEL: &str = "ws";

/// Default port of the match-event relay.
pub const DEFAULT_EVENT_SOURCE_PORT: u16 = 49322;

// ─────────────────────────────────────────────────────────────────────────────
// obs-websocket v5
// ─────────────────────────────────────────────────────────────────────────────

/// Default obs-websocket port.
pub const DEFAULT_OBS_PORT: u16 = 4455;

/// WebSocket subprotocol for JSON-encoded obs-websocket messages.
pub const OBS_SUBPROTOCOL: &str = "obswebsocket.json";

/// RPC version requested in the Identify message.
pub const OBS_RPC_VERSION: u32 = 1;

/// Op code: server greeting (Hello).
pub const OBS_OP_HELLO: u8 = 0;
/// Op code: client identification (Identify).
pub const OBS_OP_IDENTIFY: u8 = 1;
/// Op code: identification accepted (Identified).
pub const OBS_OP_IDENTIFIED: u8 = 2;
/// Op code: client request.
pub const OBS_OP_REQUEST: u8 = 6;
/// Op code: response to a client request.
pub const OBS_OP_REQUEST_RESPONSE: u8 = 7;

/// Timeout for a single obs-websocket request (seconds).
pub const OBS_REQUEST_TIMEOUT_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Command server
// ─────────────────────────────────────────────────────────────────────────────

/// Default port of the side-channel command server.
pub const DEFAULT_COMMAND_PORT: u16 = 55555;

/// Command names accepted by the command server, in the order they are listed
/// in "unknown command" responses.
pub const VALID_COMMANDS: [&str; 8] = [
    "play_matchup",
    "play_video",
    "play_audio",
    "trigger_win",
    "set_match",
    "get_current_match",
    "list_matches",
    "hide_matchup",
];
