//! Per-driver timing snapshots.
//!
//! Merges the six independent time-series into one row per driver. The
//! most recent record of each series is chosen by that series' own
//! ordering key (`date`, `lap_number`, `stint_number`); arrival order in the
//! response is irrelevant. On equal keys the record appearing later in the
//! source list wins, and records without a key rank below every record that
//! has one.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::format::{format_gap, format_lap_time, format_sector_time};
use super::records::{
    DriverNumber, DriverRecord, IntervalRecord, LapRecord, PitRecord, PositionRecord, StintRecord,
    parse_timestamp,
};

/// Sort key used for drivers without a position.
pub const UNPOSITIONED_SORT_KEY: u32 = 999;

/// Compound reported when no stint is known.
pub const UNKNOWN_COMPOUND: &str = "UNKNOWN";

/// Merged timing view for one driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverTimingSnapshot {
    /// Driver record as published upstream.
    pub driver: DriverRecord,
    /// Current race position.
    pub position: Option<u32>,
    /// Last lap time (`M:SS.mmm`).
    pub lap_time: String,
    /// Last sector 1 time.
    #[serde(rename = "sector1")]
    pub sector_1: String,
    /// Last sector 2 time.
    #[serde(rename = "sector2")]
    pub sector_2: String,
    /// Last sector 3 time.
    #[serde(rename = "sector3")]
    pub sector_3: String,
    /// Gap to the leader.
    pub gap: String,
    /// Gap to the car ahead.
    pub interval: String,
    /// Number of the latest lap.
    pub last_lap: u32,
    /// Current tyre compound.
    pub tyre_compound: String,
    /// Current tyre age in laps.
    pub tyre_age: u32,
    /// Pit stops made so far.
    pub pit_stops: usize,
}

/// The raw record sets a snapshot is built from.
#[derive(Debug, Clone, Default)]
pub struct TimingSources {
    /// Driver roster.
    pub drivers: Vec<DriverRecord>,
    /// Position updates.
    pub positions: Vec<PositionRecord>,
    /// Completed laps.
    pub laps: Vec<LapRecord>,
    /// Interval updates.
    pub intervals: Vec<IntervalRecord>,
    /// Tyre stints.
    pub stints: Vec<StintRecord>,
    /// Pit lane visits.
    pub pit_stops: Vec<PitRecord>,
}

/// Keep, per driver, the record with the greatest key.
fn latest_by<'a, T, K, F>(
    records: &'a [T],
    driver_of: impl Fn(&T) -> Option<DriverNumber>,
    key_of: F,
) -> HashMap<DriverNumber, &'a T>
where
    K: Ord,
    F: Fn(&T) -> Option<K>,
{
    let mut latest: HashMap<DriverNumber, &'a T> = HashMap::new();
    for record in records {
        let Some(driver) = driver_of(record) else {
            continue;
        };
        match latest.get(&driver) {
            Some(current) if key_of(current) > key_of(record) => {}
            _ => {
                latest.insert(driver, record);
            }
        }
    }
    latest
}

fn lookup<'a, T>(
    latest: &HashMap<DriverNumber, &'a T>,
    number: Option<DriverNumber>,
) -> Option<&'a T> {
    number.and_then(|n| latest.get(&n).copied())
}

fn position_date(record: &PositionRecord) -> Option<DateTime<Utc>> {
    record.date.as_deref().and_then(parse_timestamp)
}

fn interval_date(record: &IntervalRecord) -> Option<DateTime<Utc>> {
    record.date.as_deref().and_then(parse_timestamp)
}

/// Current tyre age: laps run on this set plus its age when fitted.
///
/// Both a stint and a lap are required; otherwise the age is 0.
#[must_use]
pub fn tyre_age(stint: Option<&StintRecord>, latest_lap: Option<&LapRecord>) -> u32 {
    let (Some(stint), Some(lap)) = (stint, latest_lap) else {
        return 0;
    };
    let current_lap = i64::from(lap.lap_number.unwrap_or(0));
    let stint_start = i64::from(stint.lap_start.unwrap_or(0));
    let age_at_start = i64::from(stint.tyre_age_at_start.unwrap_or(0));

    u32::try_from((current_lap - stint_start + age_at_start).max(0)).unwrap_or(u32::MAX)
}

/// Build the ordered snapshot list for every driver in the roster.
///
/// Drivers are sorted by position ascending; drivers without a position
/// keep their roster order after everyone else.
#[must_use]
pub fn build_snapshots(sources: &TimingSources) -> Vec<DriverTimingSnapshot> {
    let positions = latest_by(&sources.positions, |r| r.driver_number, position_date);
    let intervals = latest_by(&sources.intervals, |r| r.driver_number, interval_date);
    let laps = latest_by(&sources.laps, |r| r.driver_number, |r| r.lap_number);
    let stints = latest_by(&sources.stints, |r| r.driver_number, |r| r.stint_number);

    let mut pit_counts: HashMap<DriverNumber, usize> = HashMap::new();
    for pit in &sources.pit_stops {
        if let Some(driver) = pit.driver_number {
            *pit_counts.entry(driver).or_default() += 1;
        }
    }

    let mut snapshots: Vec<DriverTimingSnapshot> = sources
        .drivers
        .iter()
        .map(|driver| {
            let number = driver.driver_number;
            let position = lookup(&positions, number);
            let interval = lookup(&intervals, number);
            let lap = lookup(&laps, number);
            let stint = lookup(&stints, number);

            DriverTimingSnapshot {
                driver: driver.clone(),
                position: position.and_then(|p| p.position),
                lap_time: format_lap_time(lap.and_then(|l| l.lap_duration)),
                sector_1: format_sector_time(lap.and_then(|l| l.duration_sector_1)),
                sector_2: format_sector_time(lap.and_then(|l| l.duration_sector_2)),
                sector_3: format_sector_time(lap.and_then(|l| l.duration_sector_3)),
                gap: format_gap(interval.and_then(|i| i.gap_to_leader.as_ref())),
                interval: format_gap(interval.and_then(|i| i.interval.as_ref())),
                last_lap: lap.and_then(|l| l.lap_number).unwrap_or(0),
                tyre_compound: stint
                    .and_then(|s| s.compound.clone())
                    .unwrap_or_else(|| UNKNOWN_COMPOUND.to_string()),
                tyre_age: tyre_age(stint, lap),
                pit_stops: number
                    .and_then(|n| pit_counts.get(&n).copied())
                    .unwrap_or(0),
            }
        })
        .collect();

    snapshots.sort_by_key(|s| s.position.unwrap_or(UNPOSITIONED_SORT_KEY));
    snapshots
}
