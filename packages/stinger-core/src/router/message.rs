//! Wire format of the event relay.
//!
//! Every message is a JSON object `{"event": "<channel>:<name>", "data": <any>}`.
//! The channel is everything before the FIRST colon; further colons belong to
//! the event name.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::registry::SubscriptionKey;
use crate::protocol_constants::{CHANNEL_EVENT_SEPARATOR, RELAY_CHANNEL, RELAY_REGISTER_EVENT};

/// Reasons an inbound message is dropped.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("message has no string 'event' field")]
    MissingEvent,

    #[error("event '{0}' has no channel separator")]
    MissingSeparator(String),
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub channel: String,
    pub event: String,
    pub data: Value,
}

impl InboundEvent {
    /// Decodes a raw text frame.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw)?;
        let name = value
            .get("event")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingEvent)?;
        let (channel, event) = split_channel_event(name)
            .ok_or_else(|| ProtocolError::MissingSeparator(name.to_string()))?;

        Ok(Self {
            channel: channel.to_string(),
            event: event.to_string(),
            data: value.get("data").cloned().unwrap_or(Value::Null),
        })
    }
}

/// Splits `channel:event` on the first separator.
pub fn split_channel_event(name: &str) -> Option<(&str, &str)> {
    name.split_once(CHANNEL_EVENT_SEPARATOR)
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    event: String,
    data: &'a Value,
}

/// Encodes an outbound message.
pub fn encode(channel: &str, event: &str, data: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(&OutboundMessage {
        event: format!("{}{}{}", channel, CHANNEL_EVENT_SEPARATOR, event),
        data,
    })
}

/// Encodes the remote registration request for `key`.
pub fn registration_message(key: &SubscriptionKey) -> Result<String, serde_json::Error> {
    encode(
        RELAY_CHANNEL,
        RELAY_REGISTER_EVENT,
        &Value::String(key.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_match_ended() {
        let event =
            InboundEvent::parse(r#"{"event":"game:match_ended","data":{"winner_team_num":0}}"#)
                .unwrap();
        assert_eq!(event.channel, "game");
        assert_eq!(event.event, "match_ended");
        assert_eq!(event.data, json!({"winner_team_num": 0}));
    }

    #[test]
    fn splits_only_on_first_colon() {
        let event = InboundEvent::parse(r#"{"event":"game:match_ended:extra","data":null}"#).unwrap();
        assert_eq!(event.channel, "game");
        assert_eq!(event.event, "match_ended:extra");
        assert_eq!(event.data, Value::Null);
    }

    #[test]
    fn missing_data_is_null() {
        let event = InboundEvent::parse(r#"{"event":"game:goal_scored"}"#).unwrap();
        assert_eq!(event.data, Value::Null);
    }

    #[test]
    fn rejects_malformed_messages() {
        assert!(matches!(
            InboundEvent::parse("{not json"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(
            InboundEvent::parse(r#"{"data":1}"#),
            Err(ProtocolError::MissingEvent)
        ));
        assert!(matches!(
            InboundEvent::parse(r#"{"event":42}"#),
            Err(ProtocolError::MissingEvent)
        ));
        assert!(matches!(
            InboundEvent::parse(r#"{"event":"nocolon","data":1}"#),
            Err(ProtocolError::MissingSeparator(name)) if name == "nocolon"
        ));
    }

    #[test]
    fn registration_message_shape() {
        let key = SubscriptionKey::new("game", "match_ended");
        let encoded: Value = serde_json::from_str(&registration_message(&key).unwrap()).unwrap();
        assert_eq!(
            encoded,
            json!({"event": "wsRelay:register", "data": "game:match_ended"})
        );
    }

    #[test]
    fn encode_keeps_payload() {
        let encoded: Value = serde_json::from_str(
            &encode("game", "player_action", &json!({"action": "jump"})).unwrap(),
        )
        .unwrap();
        assert_eq!(
            encoded,
            json!({"event": "game:player_action", "data": {"action": "jump"}})
        );
    }
}
