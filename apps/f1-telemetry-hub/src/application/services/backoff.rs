//! Health-aware backoff policy for the streaming scheduler.
//!
//! A rate-limited upstream is left alone for at least the long backoff, or
//! longer if the rate-limit window says so. A degraded upstream is retried
//! after `short × 2^(failures − threshold)`, capped at the long backoff and
//! spread by jitter so that several hubs do not retry in lockstep.

use std::time::Duration;

use rand::Rng;

use crate::application::ports::HealthSnapshot;
use crate::infrastructure::metrics::BackoffReason;

/// Default jitter as a fraction of the delay (±10%).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.1;

/// Backoff delays derived from upstream health.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    short: Duration,
    long: Duration,
    failure_threshold: u32,
    jitter_factor: f64,
}

impl BackoffPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(short: Duration, long: Duration, failure_threshold: u32) -> Self {
        Self {
            short,
            long,
            failure_threshold,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }

    /// Override the jitter factor (0 disables jitter).
    #[must_use]
    pub const fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    /// Why polling should pause, if it should.
    #[must_use]
    pub const fn reason(&self, health: &HealthSnapshot) -> Option<BackoffReason> {
        if health.rate_limited {
            Some(BackoffReason::RateLimited)
        } else if health.consecutive_failures >= self.failure_threshold {
            Some(BackoffReason::Degraded)
        } else {
            None
        }
    }

    /// How long to wait for `reason`.
    #[must_use]
    pub fn delay(&self, reason: BackoffReason, health: &HealthSnapshot) -> Duration {
        match reason {
            BackoffReason::RateLimited => {
                let window = Duration::from_secs(health.rate_limited_for_secs.unwrap_or(0));
                self.long.max(window)
            }
            BackoffReason::Degraded => self
                .apply_jitter(self.failure_delay(health.consecutive_failures))
                .min(self.long),
        }
    }

    /// Un-jittered delay for a failure count.
    #[must_use]
    pub fn failure_delay(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(self.failure_threshold);
        self.short
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.long)
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_secs(15), Duration::from_secs(120), 5)
    }

    fn failing(consecutive_failures: u32) -> HealthSnapshot {
        HealthSnapshot {
            consecutive_failures,
            degraded: consecutive_failures >= 5,
            ..HealthSnapshot::default()
        }
    }

    #[test_case(5, 15 ; "at threshold")]
    #[test_case(6, 30 ; "one over")]
    #[test_case(8, 120 ; "three over")]
    #[test_case(40, 120 ; "capped")]
    fn failure_delay_doubles_then_caps(failures: u32, expected_secs: u64) {
        assert_eq!(
            policy().failure_delay(failures),
            Duration::from_secs(expected_secs)
        );
    }

    #[test]
    fn healthy_upstream_needs_no_backoff() {
        assert_eq!(policy().reason(&failing(4)), None);
        assert_eq!(policy().reason(&failing(5)), Some(BackoffReason::Degraded));
    }

    #[test]
    fn rate_limit_takes_precedence() {
        let health = HealthSnapshot {
            rate_limited: true,
            rate_limited_for_secs: Some(30),
            ..failing(9)
        };
        assert_eq!(policy().reason(&health), Some(BackoffReason::RateLimited));
    }

    #[test]
    fn rate_limit_waits_at_least_long_backoff() {
        let short_window = HealthSnapshot {
            rate_limited: true,
            rate_limited_for_secs: Some(30),
            ..HealthSnapshot::default()
        };
        let long_window = HealthSnapshot {
            rate_limited_for_secs: Some(300),
            ..short_window
        };

        assert_eq!(
            policy().delay(BackoffReason::RateLimited, &short_window),
            Duration::from_secs(120)
        );
        assert_eq!(
            policy().delay(BackoffReason::RateLimited, &long_window),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let policy = policy();
        for _ in 0..200 {
            let delay = policy.delay(BackoffReason::Degraded, &failing(6));
            assert!(delay >= Duration::from_secs(27), "{delay:?}");
            assert!(delay <= Duration::from_secs(33), "{delay:?}");
        }
    }

    #[test]
    fn jitter_never_exceeds_cap() {
        let policy = policy();
        for _ in 0..200 {
            assert!(policy.delay(BackoffReason::Degraded, &failing(20)) <= Duration::from_secs(120));
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        let policy = policy().with_jitter(0.0);
        assert_eq!(
            policy.delay(BackoffReason::Degraded, &failing(5)),
            Duration::from_secs(15)
        );
    }
}
