//! Streaming Scheduler
//!
//! Background loop deciding when to poll upstream and pushing the results
//! to subscribers. It runs an explicit state machine:
//!
//! ```text
//! Idle ──(subscribers)──▶ Polling ──(data)──▶ Broadcasting ──▶ Idle
//!   ▲                        │  ▲
//!   │     (rate limited)     ▼  │ (degraded: one probe poll)
//!   └───────────────────── Backoff
//! ```
//!
//! With nobody connected the loop stays in `Idle` and never calls upstream.
//! Health is read before every upstream call, so a rate limit hit midway
//! through a cycle stops the remaining fetches. A degraded upstream is only
//! cleared by a success, so each degraded backoff ends in a probe poll that
//! skips the failure-count gate until one of its own requests fails.
//! Every wait and every upstream call races the cancellation token, so
//! shutdown takes effect at the next suspension point.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::backoff::BackoffPolicy;
use super::session::SessionResolver;
use crate::application::ports::{BroadcastPort, Endpoint, HealthSnapshot, QueryParams, UpstreamPort};
use crate::domain::streaming::Envelope;
use crate::domain::subscription::Topic;
use crate::domain::timing::UpstreamRecord;
use crate::infrastructure::config::SchedulerSettings;
use crate::infrastructure::metrics::{self, BackoffReason};

/// Records fetched in one polling cycle, in broadcast order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollBatch {
    /// Session the records belong to.
    pub session_key: String,
    /// One entry per streamed topic.
    pub results: Vec<(Topic, Vec<UpstreamRecord>)>,
}

/// Scheduler state.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerState {
    /// Waiting for subscribers.
    Idle,
    /// Checking health and fetching the next batch.
    Polling {
        /// Set after a degraded backoff: go ahead despite the failure count.
        probe: bool,
    },
    /// Pushing a fetched batch to subscribers.
    Broadcasting(PollBatch),
    /// Staying away from a struggling upstream.
    Backoff {
        /// Why we are backing off.
        reason: BackoffReason,
        /// Health at the time the decision was made.
        health: HealthSnapshot,
    },
}

impl SchedulerState {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Polling { probe: false } => "polling",
            Self::Polling { probe: true } => "probing",
            Self::Broadcasting(_) => "broadcasting",
            Self::Backoff { .. } => "backoff",
        }
    }
}

/// Result of one state step: where to go and how long to wait first.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Next state.
    pub next: SchedulerState,
    /// Delay before entering it.
    pub wait: Duration,
}

impl Transition {
    const fn now(next: SchedulerState) -> Self {
        Self {
            next,
            wait: Duration::ZERO,
        }
    }

    const fn after(next: SchedulerState, wait: Duration) -> Self {
        Self { next, wait }
    }
}

/// Polls upstream on behalf of connected subscribers.
pub struct StreamingScheduler {
    upstream: Arc<dyn UpstreamPort>,
    broadcaster: Arc<dyn BroadcastPort>,
    sessions: SessionResolver,
    settings: SchedulerSettings,
    backoff: BackoffPolicy,
}

impl std::fmt::Debug for StreamingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingScheduler")
            .field("settings", &self.settings)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl StreamingScheduler {
    /// Create a scheduler.
    #[must_use]
    pub fn new(
        upstream: Arc<dyn UpstreamPort>,
        broadcaster: Arc<dyn BroadcastPort>,
        settings: SchedulerSettings,
        failure_threshold: u32,
    ) -> Self {
        let backoff = BackoffPolicy::new(
            settings.short_backoff,
            settings.long_backoff,
            failure_threshold,
        );
        Self {
            sessions: SessionResolver::new(Arc::clone(&upstream)),
            upstream,
            broadcaster,
            settings,
            backoff,
        }
    }

    /// Replace the backoff policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            idle_interval_secs = self.settings.idle_interval.as_secs(),
            "Streaming scheduler started"
        );

        let mut state = SchedulerState::Idle;
        loop {
            let from = state.name();
            let transition = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                transition = self.step(state) => transition,
            };

            tracing::debug!(
                from,
                to = transition.next.name(),
                wait_ms = transition.wait.as_millis(),
                "Scheduler transition"
            );

            if !transition.wait.is_zero() {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(transition.wait) => {}
                }
            }
            state = transition.next;
        }

        tracing::info!("Streaming scheduler stopped");
    }

    /// Execute one state and decide the next.
    pub async fn step(&self, state: SchedulerState) -> Transition {
        match state {
            SchedulerState::Idle => self.idle(),
            SchedulerState::Polling { probe } => self.poll(probe).await,
            SchedulerState::Broadcasting(batch) => self.broadcast(batch).await,
            SchedulerState::Backoff { reason, health } => self.back_off(reason, &health),
        }
    }

    fn idle(&self) -> Transition {
        if self.broadcaster.count() == 0 {
            Transition::after(SchedulerState::Idle, self.settings.idle_interval)
        } else {
            Transition::now(SchedulerState::Polling { probe: false })
        }
    }

    async fn poll(&self, probe: bool) -> Transition {
        if self.broadcaster.count() == 0 {
            return Transition::now(SchedulerState::Idle);
        }

        let baseline = self.upstream.health().consecutive_failures;
        if let Some(halt) = self.health_gate(probe, baseline) {
            return halt;
        }
        if probe {
            tracing::info!(consecutive_failures = baseline, "Probing degraded upstream");
        }

        let session = self.sessions.current_session().await;
        if let Some(halt) = self.health_gate(probe, baseline) {
            return halt;
        }
        let Some(session_key) = session.and_then(|session| session.session_key) else {
            tracing::debug!("No current session, skipping poll");
            return Transition::after(SchedulerState::Idle, self.settings.poll_interval);
        };
        let session_key = session_key.to_string();
        let params = QueryParams::session(&session_key);

        let positions = self.upstream.fetch(Endpoint::Position, &params).await;
        tokio::time::sleep(self.settings.stagger_delay).await;
        if let Some(halt) = self.health_gate(probe, baseline) {
            return halt;
        }

        let intervals = self.upstream.fetch(Endpoint::Intervals, &params).await;
        tokio::time::sleep(self.settings.stagger_delay).await;
        if let Some(halt) = self.health_gate(probe, baseline) {
            return halt;
        }

        let locations = self
            .upstream
            .fetch(
                Endpoint::Location,
                &QueryParams::recent(&session_key, self.settings.location_window, Utc::now()),
            )
            .await;

        Transition::now(SchedulerState::Broadcasting(PollBatch {
            session_key,
            results: vec![
                (Topic::Position, positions),
                (Topic::Interval, intervals),
                (Topic::Location, locations),
            ],
        }))
    }

    /// Backoff transition if upstream health says to stop before the next
    /// call. A probe ignores degradation until its failure count rises above
    /// `baseline`.
    fn health_gate(&self, probe: bool, baseline: u32) -> Option<Transition> {
        let health = self.upstream.health();
        let reason = self.backoff.reason(&health)?;
        if probe && reason == BackoffReason::Degraded && health.consecutive_failures <= baseline {
            return None;
        }
        Some(Transition::now(SchedulerState::Backoff { reason, health }))
    }

    async fn broadcast(&self, batch: PollBatch) -> Transition {
        for (topic, records) in batch.results {
            if records.is_empty() {
                continue;
            }
            let count = records.len();
            let delivered = self
                .broadcaster
                .broadcast_filtered(&Envelope::for_topic(topic, records), topic)
                .await;
            tracing::debug!(
                session_key = %batch.session_key,
                topic = %topic,
                records = count,
                delivered,
                "Broadcast topic update"
            );
        }
        metrics::record_poll_cycle();
        Transition::after(SchedulerState::Idle, self.settings.poll_interval)
    }

    fn back_off(&self, reason: BackoffReason, health: &HealthSnapshot) -> Transition {
        let wait = self.backoff.delay(reason, health);
        metrics::record_backoff(reason);
        tracing::warn!(
            reason = ?reason,
            consecutive_failures = health.consecutive_failures,
            wait_secs = wait.as_secs(),
            "Upstream unhealthy, backing off"
        );
        match reason {
            BackoffReason::RateLimited => Transition::after(SchedulerState::Idle, wait),
            BackoffReason::Degraded => {
                Transition::after(SchedulerState::Polling { probe: true }, wait)
            }
        }
    }
}
