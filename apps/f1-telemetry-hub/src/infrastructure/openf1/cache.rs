//! Response cache and service health for the OpenF1 client.
//!
//! Both are plain data guarded by the client's mutexes; nothing here awaits.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::application::ports::{Endpoint, HealthSnapshot, QueryParams};
use crate::domain::timing::UpstreamRecord;

/// Cache key: endpoint plus canonical parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    endpoint: Endpoint,
    params: QueryParams,
}

impl CacheKey {
    /// Build a key for a query.
    #[must_use]
    pub const fn new(endpoint: Endpoint, params: QueryParams) -> Self {
        Self { endpoint, params }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Vec<UpstreamRecord>,
    fetched_at: Instant,
}

/// TTL cache of upstream responses. Entries are replaced wholesale.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: HashMap<CacheKey, CacheEntry>,
}

impl ResponseCache {
    /// Data younger than `ttl`, if any.
    #[must_use]
    pub fn fresh(&self, key: &CacheKey, ttl: Duration, now: Instant) -> Option<Vec<UpstreamRecord>> {
        self.entries
            .get(key)
            .filter(|entry| now.saturating_duration_since(entry.fetched_at) < ttl)
            .map(|entry| entry.data.clone())
    }

    /// Most recent data regardless of age.
    #[must_use]
    pub fn latest(&self, key: &CacheKey) -> Option<Vec<UpstreamRecord>> {
        self.entries.get(key).map(|entry| entry.data.clone())
    }

    /// Store a response, replacing any previous one.
    pub fn store(&mut self, key: CacheKey, data: Vec<UpstreamRecord>, now: Instant) {
        self.entries.insert(
            key,
            CacheEntry {
                data,
                fetched_at: now,
            },
        );
    }

    /// Evict entries older than `max_stale`. Returns how many were removed.
    pub fn prune(&mut self, max_stale: Duration, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.fetched_at) <= max_stale);
        before - self.entries.len()
    }

    /// Number of cached responses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Consecutive failures and the open rate-limit window.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServiceHealth {
    consecutive_failures: u32,
    rate_limited_until: Option<Instant>,
}

impl ServiceHealth {
    /// Reset the failure count after a successful request. An open
    /// rate-limit window stays open until it expires.
    pub const fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Count a failed request. Returns the new failure count.
    pub const fn record_failure(&mut self) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_failures
    }

    /// Open (or extend) a rate-limit window and count the failure.
    pub fn record_rate_limit(&mut self, until: Instant) -> u32 {
        self.rate_limited_until = Some(self.rate_limited_until.map_or(until, |u| u.max(until)));
        self.record_failure()
    }

    /// Failures since the last success.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Copy out the current state.
    #[must_use]
    pub fn snapshot(&self, now: Instant, threshold: u32, cache_entries: usize) -> HealthSnapshot {
        let remaining = self
            .rate_limited_until
            .map(|until| until.saturating_duration_since(now))
            .filter(|left| !left.is_zero());

        HealthSnapshot {
            consecutive_failures: self.consecutive_failures,
            rate_limited: remaining.is_some(),
            rate_limited_for_secs: remaining
                .map(|left| left.as_secs() + u64::from(left.subsec_nanos() > 0)),
            cache_entries,
            degraded: self.consecutive_failures >= threshold,
        }
    }
}
