//! Subscription Types
//!
//! Domain types for tracking which telemetry topics each WebSocket
//! connection wants to receive.
//!
//! # Design
//!
//! Every connection owns one [`SubscriptionSet`]. An empty set means the
//! client never narrowed its feed and receives every topic; once it
//! subscribes to anything, only the listed topics are delivered.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a subscriber connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A streamed telemetry topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Topic {
    /// Race position updates.
    Position,
    /// Gap and interval updates.
    Interval,
    /// On-track car coordinates.
    Location,
}

impl Topic {
    /// Get all topics.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Position, Self::Interval, Self::Location]
    }

    /// Wire name of the topic.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Position => "POSITION",
            Self::Interval => "INTERVAL",
            Self::Location => "LOCATION",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a topic name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown topic: {0}")]
pub struct UnknownTopic(pub String);

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|topic| topic.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownTopic(s.to_string()))
    }
}

// =============================================================================
// Subscription Set
// =============================================================================

/// Topics a single connection is subscribed to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    topics: BTreeSet<Topic>,
}

impl SubscriptionSet {
    /// Create an empty set (receives every topic).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            topics: BTreeSet::new(),
        }
    }

    /// Whether a message on `topic` should be delivered.
    #[must_use]
    pub fn accepts(&self, topic: Topic) -> bool {
        self.topics.is_empty() || self.topics.contains(&topic)
    }

    /// Add topics. Returns the number newly added.
    pub fn add(&mut self, topics: &[Topic]) -> usize {
        topics.iter().filter(|t| self.topics.insert(**t)).count()
    }

    /// Remove topics. Returns the number actually removed.
    pub fn remove(&mut self, topics: &[Topic]) -> usize {
        topics.iter().filter(|t| self.topics.remove(*t)).count()
    }

    /// Whether no explicit topic was chosen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Subscribed topics in stable order.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        self.topics.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_accepts_everything() {
        let set = SubscriptionSet::new();

        for topic in Topic::all() {
            assert!(set.accepts(*topic));
        }
    }

    #[test]
    fn subscribed_set_filters() {
        let mut set = SubscriptionSet::new();
        set.add(&[Topic::Position]);

        assert!(set.accepts(Topic::Position));
        assert!(!set.accepts(Topic::Location));
    }

    #[test]
    fn add_is_idempotent() {
        let mut set = SubscriptionSet::new();

        assert_eq!(set.add(&[Topic::Position, Topic::Interval]), 2);
        assert_eq!(set.add(&[Topic::Position]), 0);
        assert_eq!(set.topics(), vec![Topic::Position, Topic::Interval]);
    }

    #[test]
    fn removing_last_topic_reopens_everything() {
        let mut set = SubscriptionSet::new();
        set.add(&[Topic::Location]);

        assert_eq!(set.remove(&[Topic::Location, Topic::Interval]), 1);
        assert!(set.is_empty());
        assert!(set.accepts(Topic::Interval));
    }

    #[test]
    fn topic_parsing_ignores_case() {
        assert_eq!("position".parse::<Topic>(), Ok(Topic::Position));
        assert_eq!(" LOCATION ".parse::<Topic>(), Ok(Topic::Location));
        assert!("WEATHER".parse::<Topic>().is_err());
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }
}
