//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Upstream**: OpenF1 requests by endpoint and outcome, cache hits,
//!   request latency, consecutive failures
//! - **Subscribers**: connected WebSocket clients, messages sent, send
//!   failures
//! - **Scheduler**: poll cycles and backoffs by reason
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::streaming::MessageType;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "f1_hub_upstream_requests_total",
        "OpenF1 requests by endpoint and outcome"
    );
    describe_counter!(
        "f1_hub_cache_hits_total",
        "Fetches answered from the response cache"
    );
    describe_histogram!(
        "f1_hub_upstream_request_seconds",
        "OpenF1 request latency"
    );
    describe_gauge!(
        "f1_hub_upstream_consecutive_failures",
        "Failed upstream attempts since the last success"
    );

    describe_gauge!(
        "f1_hub_websocket_clients",
        "Number of connected WebSocket clients"
    );
    describe_counter!(
        "f1_hub_messages_sent_total",
        "Messages delivered to WebSocket clients by type"
    );
    describe_counter!(
        "f1_hub_send_failures_total",
        "Failed sends to WebSocket clients by reason"
    );

    describe_counter!("f1_hub_poll_cycles_total", "Completed scheduler poll cycles");
    describe_counter!(
        "f1_hub_scheduler_backoffs_total",
        "Scheduler backoffs by reason"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for an upstream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// 2xx with a decodable body.
    Success,
    /// HTTP 429.
    RateLimited,
    /// Any other non-2xx status.
    HttpError,
    /// Timeout or connection failure.
    Transport,
    /// Body was not valid JSON.
    Decode,
}

impl RequestOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::RateLimited => "rate_limited",
            Self::HttpError => "http_error",
            Self::Transport => "transport",
            Self::Decode => "decode",
        }
    }
}

/// Reason label for a scheduler backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffReason {
    /// Upstream rate-limit window is open.
    RateLimited,
    /// Consecutive failures reached the threshold.
    Degraded,
}

impl BackoffReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Degraded => "degraded",
        }
    }
}

const fn message_type_label(kind: MessageType) -> &'static str {
    match kind {
        MessageType::SessionInfo => "session_info",
        MessageType::NoSession => "no_session",
        MessageType::Position => "position",
        MessageType::Interval => "interval",
        MessageType::Location => "location",
        MessageType::Heartbeat => "heartbeat",
        MessageType::Pong => "pong",
        MessageType::ConnectionStats => "connection_stats",
    }
}

/// Record an upstream request and its latency.
pub fn record_upstream_request(endpoint: &'static str, outcome: RequestOutcome, elapsed: Duration) {
    counter!(
        "f1_hub_upstream_requests_total",
        "endpoint" => endpoint,
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!("f1_hub_upstream_request_seconds", "endpoint" => endpoint)
        .record(elapsed.as_secs_f64());
}

/// Record a cache hit.
pub fn record_cache_hit(endpoint: &'static str) {
    counter!("f1_hub_cache_hits_total", "endpoint" => endpoint).increment(1);
}

/// Update the consecutive failure gauge.
pub fn set_consecutive_failures(count: u32) {
    gauge!("f1_hub_upstream_consecutive_failures").set(f64::from(count));
}

/// Update the connected client count.
#[allow(clippy::cast_precision_loss)]
pub fn set_websocket_clients(count: usize) {
    gauge!("f1_hub_websocket_clients").set(count as f64);
}

/// Record messages delivered to clients.
pub fn record_messages_sent(kind: MessageType, count: u64) {
    counter!(
        "f1_hub_messages_sent_total",
        "message_type" => message_type_label(kind)
    )
    .increment(count);
}

/// Record a failed send.
pub fn record_send_failure(reason: &'static str) {
    counter!("f1_hub_send_failures_total", "reason" => reason).increment(1);
}

/// Record a completed poll cycle.
pub fn record_poll_cycle() {
    counter!("f1_hub_poll_cycles_total").increment(1);
}

/// Record a scheduler backoff.
pub fn record_backoff(reason: BackoffReason) {
    counter!("f1_hub_scheduler_backoffs_total", "reason" => reason.as_str()).increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_as_str() {
        assert_eq!(RequestOutcome::Success.as_str(), "success");
        assert_eq!(RequestOutcome::RateLimited.as_str(), "rate_limited");
        assert_eq!(RequestOutcome::HttpError.as_str(), "http_error");
    }

    #[test]
    fn backoff_reason_as_str() {
        assert_eq!(BackoffReason::RateLimited.as_str(), "rate_limited");
        assert_eq!(BackoffReason::Degraded.as_str(), "degraded");
    }

    #[test]
    fn message_type_labels() {
        assert_eq!(message_type_label(MessageType::ConnectionStats), "connection_stats");
        assert_eq!(message_type_label(MessageType::Position), "position");
    }

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        record_upstream_request("laps", RequestOutcome::Success, Duration::from_millis(5));
        record_cache_hit("laps");
        set_websocket_clients(3);
    }
}
