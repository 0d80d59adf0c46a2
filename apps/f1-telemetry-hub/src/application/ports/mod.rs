//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `UpstreamPort`: cached access to the OpenF1 REST API
//! - `BroadcastPort`: message distribution to WebSocket subscribers

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::domain::streaming::Envelope;
use crate::domain::subscription::Topic;
use crate::domain::timing::UpstreamRecord;

// =============================================================================
// Upstream
// =============================================================================

/// OpenF1 endpoints the hub reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    /// Session metadata.
    Sessions,
    /// Driver roster.
    Drivers,
    /// Race positions.
    Position,
    /// Completed laps.
    Laps,
    /// Gaps and intervals.
    Intervals,
    /// Tyre stints.
    Stints,
    /// Pit lane visits.
    Pit,
    /// Car coordinates.
    Location,
    /// Car telemetry channels.
    CarData,
    /// Track weather.
    Weather,
}

impl Endpoint {
    /// Path segment under the API base URL.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sessions => "sessions",
            Self::Drivers => "drivers",
            Self::Position => "position",
            Self::Laps => "laps",
            Self::Intervals => "intervals",
            Self::Stints => "stints",
            Self::Pit => "pit",
            Self::Location => "location",
            Self::CarData => "car_data",
            Self::Weather => "weather",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Granularity of date-windowed cutoffs. Matches the default cache TTL.
pub const RECENT_CUTOFF_STEP_SECS: i64 = 5;

/// Query parameters, kept sorted so equal queries produce equal cache keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    /// Empty parameter set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Add a parameter, replacing any previous value for the key.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    /// Parameters filtered to one session.
    #[must_use]
    pub fn session(session_key: impl ToString) -> Self {
        Self::new().with("session_key", session_key)
    }

    /// Parameters for one session, limited to records dated after `now - window`.
    ///
    /// The cutoff is floored to a multiple of [`RECENT_CUTOFF_STEP_SECS`] so
    /// that repeated queries within one step share a cache key.
    #[must_use]
    pub fn recent(session_key: impl ToString, window: Duration, now: DateTime<Utc>) -> Self {
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let secs = cutoff.timestamp();
        let cutoff = DateTime::from_timestamp(secs - secs.rem_euclid(RECENT_CUTOFF_STEP_SECS), 0)
            .unwrap_or(cutoff);
        Self::session(session_key).with(
            "date",
            format!(">={}", cutoff.to_rfc3339_opts(SecondsFormat::Secs, true)),
        )
    }

    /// Value of one parameter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterate key/value pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether no parameter is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for QueryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

/// Point-in-time copy of upstream health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    /// Failed attempts since the last success.
    pub consecutive_failures: u32,
    /// Whether a rate-limit window is still open.
    pub rate_limited: bool,
    /// Seconds left in the rate-limit window.
    pub rate_limited_for_secs: Option<u64>,
    /// Entries currently held in the response cache.
    pub cache_entries: usize,
    /// Whether failures reached the degradation threshold.
    pub degraded: bool,
}

/// Cached access to the upstream API.
///
/// `fetch` never fails: on any upstream problem it degrades to the last
/// cached value for the same query, or to an empty list.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpstreamPort: Send + Sync {
    /// Fetch the records of `endpoint` matching `params`.
    async fn fetch(&self, endpoint: Endpoint, params: &QueryParams) -> Vec<UpstreamRecord>;

    /// Current upstream health.
    fn health(&self) -> HealthSnapshot;
}

// =============================================================================
// Broadcast
// =============================================================================

/// Fan-out to connected subscribers.
#[async_trait]
pub trait BroadcastPort: Send + Sync {
    /// Number of registered connections.
    fn count(&self) -> usize;

    /// Send to every connection. Returns the number of successful sends.
    async fn broadcast(&self, envelope: &Envelope) -> usize;

    /// Send to connections accepting `topic`. Returns the number of
    /// successful sends.
    async fn broadcast_filtered(&self, envelope: &Envelope, topic: Topic) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_params_are_canonical() {
        let a = QueryParams::new().with("year", 2024).with("session_key", "latest");
        let b = QueryParams::new().with("session_key", "latest").with("year", 2024);

        assert_eq!(a, b);
        assert_eq!(a.to_string(), "session_key=latest&year=2024");
    }

    #[test]
    fn recent_window_cutoff() {
        let now = DateTime::parse_from_rfc3339("2024-03-02T15:00:30Z")
            .unwrap()
            .with_timezone(&Utc);
        let params = QueryParams::recent(9158, Duration::from_secs(30), now);

        assert_eq!(params.get("session_key"), Some("9158"));
        assert_eq!(params.get("date"), Some(">=2024-03-02T15:00:00Z"));
    }

    #[test]
    fn recent_cutoff_is_stable_within_a_step() {
        let at = |ts: &str| DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc);
        let window = Duration::from_secs(30);

        let first = QueryParams::recent(9158, window, at("2024-03-02T15:00:35.120Z"));
        let second = QueryParams::recent(9158, window, at("2024-03-02T15:00:39.870Z"));
        let next_step = QueryParams::recent(9158, window, at("2024-03-02T15:00:40.010Z"));

        assert_eq!(first, second);
        assert_eq!(first.get("date"), Some(">=2024-03-02T15:00:05Z"));
        assert_eq!(next_step.get("date"), Some(">=2024-03-02T15:00:10Z"));
    }

    #[test]
    fn endpoint_paths() {
        assert_eq!(Endpoint::CarData.as_str(), "car_data");
        assert_eq!(Endpoint::Position.to_string(), "position");
    }
}
