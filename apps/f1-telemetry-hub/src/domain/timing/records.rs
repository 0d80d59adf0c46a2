//! OpenF1 Record Types
//!
//! Typed views over the opaque upstream records. Every field is optional and
//! decoded leniently: a field with an unexpected shape becomes `None` instead
//! of rejecting the whole record, and records that still fail to decode are
//! skipped by [`decode_records`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One element of an upstream time-series, as returned by the API.
pub type UpstreamRecord = Value;

/// A driver number as used across every OpenF1 endpoint.
pub type DriverNumber = u32;

// =============================================================================
// Lenient decoding
// =============================================================================

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// Decode every record that fits `T`, skipping the ones that do not.
#[must_use]
pub fn decode_records<T: DeserializeOwned>(records: &[UpstreamRecord]) -> Vec<T> {
    records
        .iter()
        .filter_map(|record| match T::deserialize(record) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping undecodable upstream record");
                None
            }
        })
        .collect()
}

/// Parse an upstream timestamp.
///
/// Accepts RFC 3339 and offset-less ISO-8601 (treated as UTC).
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

// =============================================================================
// Drivers and sessions
// =============================================================================

/// A driver entry from the `drivers` endpoint.
///
/// Fields the hub does not interpret are kept in `extra` and serialized back
/// out unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverRecord {
    /// Car number.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub driver_number: Option<DriverNumber>,
    /// Three-letter acronym (e.g. `HAM`).
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub name_acronym: Option<String>,
    /// Full driver name.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    /// Team name.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    /// Remaining upstream fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A session entry from the `sessions` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session key used to query every other endpoint.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub session_key: Option<u64>,
    /// Session name (e.g. `Race`, `Qualifying`).
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,
    /// Short circuit name.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub circuit_short_name: Option<String>,
    /// Session start time.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub date_start: Option<String>,
    /// Remaining upstream fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionRecord {
    /// Parsed session start, if present and well-formed.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.date_start.as_deref().and_then(parse_timestamp)
    }
}

// =============================================================================
// Time-series records
// =============================================================================

/// A position update from the `position` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PositionRecord {
    /// Car number.
    #[serde(default, deserialize_with = "lenient")]
    pub driver_number: Option<DriverNumber>,
    /// Time of the update.
    #[serde(default, deserialize_with = "lenient")]
    pub date: Option<String>,
    /// Race position.
    #[serde(default, deserialize_with = "lenient")]
    pub position: Option<u32>,
}

/// A gap value: seconds, or a textual marker such as `+1 LAP`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum GapValue {
    /// Gap in seconds.
    Seconds(f64),
    /// Non-numeric gap as sent upstream.
    Text(String),
}

/// An interval update from the `intervals` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IntervalRecord {
    /// Car number.
    #[serde(default, deserialize_with = "lenient")]
    pub driver_number: Option<DriverNumber>,
    /// Time of the update.
    #[serde(default, deserialize_with = "lenient")]
    pub date: Option<String>,
    /// Gap to the race leader.
    #[serde(default, deserialize_with = "lenient")]
    pub gap_to_leader: Option<GapValue>,
    /// Gap to the car ahead.
    #[serde(default, deserialize_with = "lenient")]
    pub interval: Option<GapValue>,
}

/// A completed lap from the `laps` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LapRecord {
    /// Car number.
    #[serde(default, deserialize_with = "lenient")]
    pub driver_number: Option<DriverNumber>,
    /// Lap number, starting at 1.
    #[serde(default, deserialize_with = "lenient")]
    pub lap_number: Option<u32>,
    /// Lap time in seconds.
    #[serde(default, deserialize_with = "lenient")]
    pub lap_duration: Option<f64>,
    /// Sector 1 time in seconds.
    #[serde(default, deserialize_with = "lenient")]
    pub duration_sector_1: Option<f64>,
    /// Sector 2 time in seconds.
    #[serde(default, deserialize_with = "lenient")]
    pub duration_sector_2: Option<f64>,
    /// Sector 3 time in seconds.
    #[serde(default, deserialize_with = "lenient")]
    pub duration_sector_3: Option<f64>,
}

/// A tyre stint from the `stints` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StintRecord {
    /// Car number.
    #[serde(default, deserialize_with = "lenient")]
    pub driver_number: Option<DriverNumber>,
    /// Stint number, starting at 1.
    #[serde(default, deserialize_with = "lenient")]
    pub stint_number: Option<u32>,
    /// Tyre compound (e.g. `SOFT`).
    #[serde(default, deserialize_with = "lenient")]
    pub compound: Option<String>,
    /// First lap of the stint.
    #[serde(default, deserialize_with = "lenient")]
    pub lap_start: Option<u32>,
    /// Last lap of the stint, if finished.
    #[serde(default, deserialize_with = "lenient")]
    pub lap_end: Option<u32>,
    /// Tyre age in laps when the stint started.
    #[serde(default, deserialize_with = "lenient")]
    pub tyre_age_at_start: Option<u32>,
}

/// A pit lane visit from the `pit` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PitRecord {
    /// Car number.
    #[serde(default, deserialize_with = "lenient")]
    pub driver_number: Option<DriverNumber>,
    /// Lap on which the stop happened.
    #[serde(default, deserialize_with = "lenient")]
    pub lap_number: Option<u32>,
    /// Time spent in the pit lane, in seconds.
    #[serde(default, deserialize_with = "lenient")]
    pub pit_duration: Option<f64>,
}
