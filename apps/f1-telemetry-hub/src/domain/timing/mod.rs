//! Timing Domain
//!
//! OpenF1 record types, the per-driver snapshot merge and the fixed-width
//! timing formats shown on the board.

mod format;
mod records;
mod snapshot;

pub use format::{
    NO_GAP, NO_LAP_TIME, NO_SECTOR_TIME, format_gap, format_gap_seconds, format_lap_time,
    format_sector_time,
};
pub use records::{
    DriverNumber, DriverRecord, GapValue, IntervalRecord, LapRecord, PitRecord, PositionRecord,
    SessionRecord, StintRecord, UpstreamRecord, decode_records, parse_timestamp,
};
pub use snapshot::{
    DriverTimingSnapshot, TimingSources, UNKNOWN_COMPOUND, UNPOSITIONED_SORT_KEY, build_snapshots,
    tyre_age,
};
