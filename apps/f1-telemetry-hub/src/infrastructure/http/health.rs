//! Health, readiness and metrics handlers.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::AppState;
use crate::application::ports::HealthSnapshot;
use crate::infrastructure::metrics::get_metrics_handle;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Hub version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Upstream client health.
    pub upstream: HealthSnapshot,
    /// Connected WebSocket clients.
    pub websocket_connections: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Upstream answering normally.
    Healthy,
    /// Recent failures or an open rate-limit window.
    Degraded,
    /// Failures reached the degradation threshold.
    Unhealthy,
}

impl HealthStatus {
    /// Classify upstream health.
    #[must_use]
    pub const fn from_upstream(health: &HealthSnapshot) -> Self {
        if health.degraded {
            Self::Unhealthy
        } else if health.rate_limited || health.consecutive_failures > 0 {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }
}

pub(super) async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

pub(super) async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub(super) async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.upstream().health().degraded {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    } else {
        (StatusCode::OK, "READY")
    }
}

pub(super) async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let upstream = state.upstream().health();

    HealthResponse {
        status: HealthStatus::from_upstream(&upstream),
        version: state.version().to_string(),
        uptime_secs: state.uptime().as_secs(),
        current_time: Utc::now(),
        upstream,
        websocket_connections: state.broadcast().count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn status_from_upstream() {
        assert_eq!(
            HealthStatus::from_upstream(&HealthSnapshot::default()),
            HealthStatus::Healthy
        );
        assert_eq!(
            HealthStatus::from_upstream(&HealthSnapshot {
                consecutive_failures: 2,
                ..HealthSnapshot::default()
            }),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::from_upstream(&HealthSnapshot {
                rate_limited: true,
                rate_limited_for_secs: Some(10),
                ..HealthSnapshot::default()
            }),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::from_upstream(&HealthSnapshot {
                consecutive_failures: 5,
                degraded: true,
                ..HealthSnapshot::default()
            }),
            HealthStatus::Unhealthy
        );
    }
}
