//! Timing Aggregator
//!
//! Fetches the six timing sources of a session concurrently and merges them
//! into one ordered board. A source that fails upstream arrives as an empty
//! list and simply leaves its columns at their placeholders.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::ports::{Endpoint, QueryParams, UpstreamPort};
use crate::domain::timing::{DriverTimingSnapshot, TimingSources, build_snapshots, decode_records};

/// Aggregated timing for one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingBoard {
    /// Drivers ordered by position.
    #[serde(rename = "driverTimings")]
    pub snapshots: Vec<DriverTimingSnapshot>,
    /// When the board was built.
    #[serde(rename = "lastUpdate")]
    pub generated_at: DateTime<Utc>,
    /// Session the board belongs to.
    pub session_key: String,
    /// Number of drivers in the roster.
    pub total_drivers: usize,
}

/// Aggregation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregationError {
    /// The drivers endpoint returned nothing usable.
    #[error("No drivers found")]
    NoDriverRoster {
        /// Session that was queried.
        session_key: String,
    },
}

/// Builds timing boards from the upstream port.
#[derive(Clone)]
pub struct TimingAggregator {
    upstream: Arc<dyn UpstreamPort>,
}

impl std::fmt::Debug for TimingAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimingAggregator").finish_non_exhaustive()
    }
}

impl TimingAggregator {
    /// Create an aggregator over `upstream`.
    #[must_use]
    pub fn new(upstream: Arc<dyn UpstreamPort>) -> Self {
        Self { upstream }
    }

    /// Build the timing board for `session_key`.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::NoDriverRoster`] when no driver is known
    /// for the session.
    pub async fn aggregate(&self, session_key: &str) -> Result<TimingBoard, AggregationError> {
        let params = QueryParams::session(session_key);
        let upstream = self.upstream.as_ref();

        let (drivers, positions, laps, intervals, stints, pit_stops) = tokio::join!(
            upstream.fetch(Endpoint::Drivers, &params),
            upstream.fetch(Endpoint::Position, &params),
            upstream.fetch(Endpoint::Laps, &params),
            upstream.fetch(Endpoint::Intervals, &params),
            upstream.fetch(Endpoint::Stints, &params),
            upstream.fetch(Endpoint::Pit, &params),
        );

        let sources = TimingSources {
            drivers: decode_records(&drivers),
            positions: decode_records(&positions),
            laps: decode_records(&laps),
            intervals: decode_records(&intervals),
            stints: decode_records(&stints),
            pit_stops: decode_records(&pit_stops),
        };

        if sources.drivers.is_empty() {
            tracing::info!(session_key, "No driver roster for session");
            return Err(AggregationError::NoDriverRoster {
                session_key: session_key.to_string(),
            });
        }

        let snapshots = build_snapshots(&sources);
        tracing::debug!(
            session_key,
            drivers = sources.drivers.len(),
            positions = sources.positions.len(),
            laps = sources.laps.len(),
            "Timing board built"
        );

        Ok(TimingBoard {
            total_drivers: sources.drivers.len(),
            snapshots,
            generated_at: Utc::now(),
            session_key: session_key.to_string(),
        })
    }
}
