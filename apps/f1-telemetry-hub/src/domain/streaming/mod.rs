//! Streaming Message Types
//!
//! The JSON envelopes exchanged over the real-time channel. Every outbound
//! message is `{type, data, timestamp}`; inbound client messages are
//! `{type, data?}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::subscription::Topic;

// =============================================================================
// Outbound
// =============================================================================

/// Outbound message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Session greeting sent on connect.
    SessionInfo,
    /// No session could be resolved on connect.
    NoSession,
    /// Position records.
    Position,
    /// Interval records.
    Interval,
    /// Location records.
    Location,
    /// Keep-alive pushed when the client is idle.
    Heartbeat,
    /// Reply to a client `PING`.
    Pong,
    /// Current subscriber count.
    ConnectionStats,
}

impl From<Topic> for MessageType {
    fn from(topic: Topic) -> Self {
        match topic {
            Topic::Position => Self::Position,
            Topic::Interval => Self::Interval,
            Topic::Location => Self::Location,
        }
    }
}

/// An outbound message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Payload.
    pub data: Value,
    /// Creation time (RFC 3339).
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Create an envelope stamped with the current time.
    #[must_use]
    pub fn new(kind: MessageType, data: Value) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now(),
        }
    }

    /// Envelope carrying a batch of records for `topic`.
    #[must_use]
    pub fn for_topic(topic: Topic, records: Vec<Value>) -> Self {
        Self::new(topic.into(), Value::Array(records))
    }

    /// Idle keep-alive.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self::new(MessageType::Heartbeat, serde_json::json!({}))
    }

    /// Reply to a `PING`.
    #[must_use]
    pub fn pong() -> Self {
        Self::new(MessageType::Pong, serde_json::json!({}))
    }

    /// Subscriber count announcement.
    #[must_use]
    pub fn connection_stats(total_connections: usize) -> Self {
        Self::new(
            MessageType::ConnectionStats,
            serde_json::json!({ "totalConnections": total_connections }),
        )
    }

    /// Serialize to JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Inbound
// =============================================================================

/// A parsed client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Narrow the feed to these topics.
    Subscribe(Vec<Topic>),
    /// Stop receiving these topics.
    Unsubscribe(Vec<Topic>),
    /// Liveness probe.
    Ping,
}

/// Errors from parsing a client message.
#[derive(Debug, thiserror::Error)]
pub enum ClientMessageError {
    /// Not valid JSON or missing `type`.
    #[error("malformed client message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Unrecognised `type`.
    #[error("unknown client message type: {0}")]
    UnknownType(String),
}

#[derive(Debug, Deserialize)]
struct RawClientMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopicList {
    #[serde(default)]
    data_types: Vec<Value>,
}

impl TopicList {
    /// Known topics in request order; unknown names are ignored.
    fn into_topics(self) -> Vec<Topic> {
        self.data_types
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|name| match name.parse::<Topic>() {
                Ok(topic) => Some(topic),
                Err(e) => {
                    tracing::debug!(error = %e, "Ignoring unknown topic");
                    None
                }
            })
            .collect()
    }
}

impl ClientMessage {
    /// Parse a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object with a known
    /// `type`.
    pub fn parse(text: &str) -> Result<Self, ClientMessageError> {
        let raw: RawClientMessage = serde_json::from_str(text)?;
        let topics = || serde_json::from_value::<TopicList>(raw.data.clone()).unwrap_or_default();

        match raw.kind.to_ascii_uppercase().as_str() {
            "SUBSCRIBE" => Ok(Self::Subscribe(topics().into_topics())),
            "UNSUBSCRIBE" => Ok(Self::Unsubscribe(topics().into_topics())),
            "PING" => Ok(Self::Ping),
            _ => Err(ClientMessageError::UnknownType(raw.kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn envelope_wire_shape() {
        let envelope = Envelope::for_topic(Topic::Position, vec![json!({"driver_number": 1})]);
        let wire: Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();

        assert_eq!(wire["type"], "POSITION");
        assert_eq!(wire["data"][0]["driver_number"], 1);
        assert!(wire["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn message_type_names() {
        assert_eq!(
            serde_json::to_value(MessageType::ConnectionStats).unwrap(),
            "CONNECTION_STATS"
        );
        assert_eq!(serde_json::to_value(MessageType::NoSession).unwrap(), "NO_SESSION");
    }

    #[test]
    fn parse_subscribe_ignores_unknown_topics() {
        let msg = ClientMessage::parse(
            r#"{"type":"SUBSCRIBE","data":{"dataTypes":["POSITION","WEATHER","location"]}}"#,
        )
        .unwrap();

        assert_eq!(msg, ClientMessage::Subscribe(vec![Topic::Position, Topic::Location]));
    }

    #[test]
    fn parse_unsubscribe_without_data() {
        let msg = ClientMessage::parse(r#"{"type":"UNSUBSCRIBE"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Unsubscribe(vec![]));
    }

    #[test]
    fn parse_ping() {
        assert_eq!(ClientMessage::parse(r#"{"type":"PING"}"#).unwrap(), ClientMessage::Ping);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            ClientMessage::parse("not json"),
            Err(ClientMessageError::Malformed(_))
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"DANCE"}"#),
            Err(ClientMessageError::UnknownType(_))
        ));
    }
}
