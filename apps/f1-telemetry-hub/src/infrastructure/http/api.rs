//! JSON read routes.
//!
//! Thin lookups over the session resolver, the timing aggregator and the
//! upstream port. Upstream problems never surface here as errors: the port
//! already degraded them to cached or empty data.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use super::AppState;
use crate::application::ports::{Endpoint, QueryParams};
use crate::domain::timing::DriverNumber;

/// Window used for the car telemetry lookup.
const TELEMETRY_WINDOW: Duration = Duration::from_secs(10);

/// Error body in the `{"detail": ...}` shape clients expect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ApiError {
    status: StatusCode,
    detail: &'static str,
}

impl ApiError {
    const fn not_found(detail: &'static str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

pub(super) async fn root(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "message": "F1 Telemetry Hub",
        "version": state.version(),
        "status": "running",
        "timestamp": Utc::now(),
    }))
}

pub(super) async fn current_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let session = state
        .sessions()
        .current_session()
        .await
        .ok_or(ApiError::not_found("No current session found"))?;
    Ok(Json(serde_json::to_value(session).unwrap_or_default()))
}

pub(super) async fn session_by_key(
    State(state): State<Arc<AppState>>,
    Path(session_key): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = state
        .sessions()
        .session_by_key(&session_key)
        .await
        .ok_or(ApiError::not_found("Session not found"))?;
    Ok(Json(serde_json::to_value(session).unwrap_or_default()))
}

pub(super) async fn drivers(
    State(state): State<Arc<AppState>>,
    Path(session_key): Path<String>,
) -> Json<Value> {
    let drivers = session_records(&state, Endpoint::Drivers, &session_key).await;
    Json(json!({ "drivers": drivers }))
}

pub(super) async fn positions(
    State(state): State<Arc<AppState>>,
    Path(session_key): Path<String>,
) -> Json<Value> {
    let positions = session_records(&state, Endpoint::Position, &session_key).await;
    Json(json!({ "positions": positions }))
}

pub(super) async fn live_timing(
    State(state): State<Arc<AppState>>,
    Path(session_key): Path<String>,
) -> Json<Value> {
    match state.aggregator().aggregate(&session_key).await {
        Ok(board) => Json(serde_json::to_value(board).unwrap_or_default()),
        Err(e) => {
            tracing::info!(session_key = %session_key, error = %e, "Live timing unavailable");
            Json(json!({ "driverTimings": [], "error": e.to_string() }))
        }
    }
}

pub(super) async fn locations(
    State(state): State<Arc<AppState>>,
    Path(session_key): Path<String>,
) -> Json<Value> {
    let params = QueryParams::recent(&session_key, state.location_window(), Utc::now());
    let locations = state.upstream().fetch(Endpoint::Location, &params).await;
    Json(json!({ "locations": locations }))
}

/// Query string of the telemetry route.
#[derive(Debug, Default, Deserialize)]
pub(super) struct TelemetryQuery {
    driver_number: Option<DriverNumber>,
}

pub(super) async fn telemetry(
    State(state): State<Arc<AppState>>,
    Path(session_key): Path<String>,
    Query(query): Query<TelemetryQuery>,
) -> Json<Value> {
    let mut params = QueryParams::recent(&session_key, TELEMETRY_WINDOW, Utc::now());
    if let Some(driver_number) = query.driver_number {
        params = params.with("driver_number", driver_number);
    }
    let telemetry = state.upstream().fetch(Endpoint::CarData, &params).await;
    Json(json!({ "telemetry": telemetry }))
}

pub(super) async fn pit_stops(
    State(state): State<Arc<AppState>>,
    Path(session_key): Path<String>,
) -> Json<Value> {
    let (pit_stops, stints) = tokio::join!(
        session_records(&state, Endpoint::Pit, &session_key),
        session_records(&state, Endpoint::Stints, &session_key),
    );
    Json(json!({ "pit_stops": pit_stops, "stints": stints }))
}

pub(super) async fn weather(
    State(state): State<Arc<AppState>>,
    Path(session_key): Path<String>,
) -> Json<Value> {
    let weather = session_records(&state, Endpoint::Weather, &session_key).await;
    Json(json!({ "weather": weather }))
}

async fn session_records(state: &AppState, endpoint: Endpoint, session_key: &str) -> Vec<Value> {
    state
        .upstream()
        .fetch(endpoint, &QueryParams::session(session_key))
        .await
}
