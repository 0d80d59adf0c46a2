//! Timing string formatting.
//!
//! All durations are rounded to whole milliseconds before being split into
//! minutes and seconds, so `59.9996` renders as `1:00.000`, never `0:60.000`.

use super::records::GapValue;

/// Placeholder for a missing lap time.
pub const NO_LAP_TIME: &str = "--:--.---";

/// Placeholder for a missing sector time.
pub const NO_SECTOR_TIME: &str = "---.---";

/// Placeholder for a missing gap or interval.
pub const NO_GAP: &str = "--";

const MILLIS_PER_SECOND: u64 = 1_000;
const MILLIS_PER_MINUTE: u64 = 60_000;

/// Convert a positive, finite duration to whole milliseconds.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn positive_millis(seconds: Option<f64>) -> Option<u64> {
    let seconds = seconds.filter(|s| s.is_finite() && *s > 0.0)?;
    let millis = (seconds * MILLIS_PER_SECOND as f64).round();
    (millis >= 1.0).then_some(millis as u64)
}

fn minutes_form(millis: u64) -> String {
    let minutes = millis / MILLIS_PER_MINUTE;
    let rest = millis % MILLIS_PER_MINUTE;
    format!(
        "{minutes}:{:02}.{:03}",
        rest / MILLIS_PER_SECOND,
        rest % MILLIS_PER_SECOND
    )
}

fn seconds_form(millis: u64) -> String {
    format!("{}.{:03}", millis / MILLIS_PER_SECOND, millis % MILLIS_PER_SECOND)
}

/// Format a lap time as `M:SS.mmm`.
#[must_use]
pub fn format_lap_time(seconds: Option<f64>) -> String {
    positive_millis(seconds).map_or_else(|| NO_LAP_TIME.to_string(), minutes_form)
}

/// Format a sector time as `S.mmm`.
#[must_use]
pub fn format_sector_time(seconds: Option<f64>) -> String {
    positive_millis(seconds).map_or_else(|| NO_SECTOR_TIME.to_string(), seconds_form)
}

/// Format a gap in seconds: `+S.mmm` under a minute, `+M:SS.mmm` above.
#[must_use]
pub fn format_gap_seconds(seconds: Option<f64>) -> String {
    match positive_millis(seconds) {
        None => NO_GAP.to_string(),
        Some(millis) if millis < MILLIS_PER_MINUTE => format!("+{}", seconds_form(millis)),
        Some(millis) => format!("+{}", minutes_form(millis)),
    }
}

/// Format an upstream gap value. Textual gaps pass through unchanged.
#[must_use]
pub fn format_gap(gap: Option<&GapValue>) -> String {
    match gap {
        Some(GapValue::Seconds(seconds)) => format_gap_seconds(Some(*seconds)),
        Some(GapValue::Text(text)) if !text.trim().is_empty() => text.clone(),
        _ => NO_GAP.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;

    #[test_case(Some(91.234), "1:31.234" ; "over a minute")]
    #[test_case(Some(45.5), "0:45.500" ; "under a minute")]
    #[test_case(Some(59.9996), "1:00.000" ; "rounds up into next minute")]
    #[test_case(Some(0.0), NO_LAP_TIME ; "zero")]
    #[test_case(Some(-3.0), NO_LAP_TIME ; "negative")]
    #[test_case(Some(f64::NAN), NO_LAP_TIME ; "not a number")]
    #[test_case(None, NO_LAP_TIME ; "missing")]
    fn lap_time(input: Option<f64>, expected: &str) {
        assert_eq!(format_lap_time(input), expected);
    }

    #[test_case(Some(28.5), "28.500" ; "regular")]
    #[test_case(Some(7.0406), "7.041" ; "rounded")]
    #[test_case(Some(0.0), NO_SECTOR_TIME ; "zero")]
    #[test_case(None, NO_SECTOR_TIME ; "missing")]
    fn sector_time(input: Option<f64>, expected: &str) {
        assert_eq!(format_sector_time(input), expected);
    }

    #[test_case(Some(1.234), "+1.234" ; "sub minute")]
    #[test_case(Some(75.5), "+1:15.500" ; "over a minute")]
    #[test_case(Some(0.0), NO_GAP ; "zero is the leader")]
    #[test_case(Some(-0.5), NO_GAP ; "negative")]
    #[test_case(None, NO_GAP ; "missing")]
    fn gap_seconds(input: Option<f64>, expected: &str) {
        assert_eq!(format_gap_seconds(input), expected);
    }

    #[test]
    fn textual_gap_passes_through() {
        let gap = GapValue::Text("+1 LAP".to_string());
        assert_eq!(format_gap(Some(&gap)), "+1 LAP");
        assert_eq!(format_gap(Some(&GapValue::Text("  ".into()))), NO_GAP);
        assert_eq!(format_gap(None), NO_GAP);
    }

    proptest! {
        #[test]
        fn lap_time_shape(seconds in 0.001f64..7_200.0) {
            let formatted = format_lap_time(Some(seconds));
            let (minutes, rest) = formatted.split_once(':').unwrap();
            prop_assert!(minutes.parse::<u64>().is_ok());
            prop_assert_eq!(rest.len(), 6);
            let secs: f64 = rest.parse().unwrap();
            prop_assert!(secs < 60.0);
        }

        #[test]
        fn gap_always_signed(seconds in 0.001f64..600.0) {
            prop_assert!(format_gap_seconds(Some(seconds)).starts_with('+'));
        }
    }
}
