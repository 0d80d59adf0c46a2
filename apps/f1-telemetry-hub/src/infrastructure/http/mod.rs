//! HTTP Server
//!
//! One axum server carries the WebSocket endpoint, the health probes, the
//! Prometheus endpoint and a thin JSON read API over the core services.
//!
//! # Endpoints
//!
//! - `GET /ws` - real-time subscription channel
//! - `GET /health`, `/healthz`, `/readyz` - health and probes
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /api/...` - session, driver and timing lookups

mod api;
mod health;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use health::{HealthResponse, HealthStatus};

use crate::application::ports::UpstreamPort;
use crate::application::services::{SessionResolver, TimingAggregator};
use crate::infrastructure::broadcast::BroadcastManager;
use crate::infrastructure::config::WebSocketSettings;
use crate::infrastructure::websocket;

// =============================================================================
// Shared State
// =============================================================================

/// State shared by every HTTP and WebSocket handler.
pub struct AppState {
    version: String,
    started_at: Instant,
    upstream: Arc<dyn UpstreamPort>,
    broadcast: Arc<BroadcastManager>,
    aggregator: TimingAggregator,
    sessions: SessionResolver,
    websocket: WebSocketSettings,
    location_window: Duration,
}

impl AppState {
    /// Create the shared state.
    #[must_use]
    pub fn new(
        upstream: Arc<dyn UpstreamPort>,
        broadcast: Arc<BroadcastManager>,
        websocket: WebSocketSettings,
        location_window: Duration,
    ) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
            aggregator: TimingAggregator::new(Arc::clone(&upstream)),
            sessions: SessionResolver::new(Arc::clone(&upstream)),
            upstream,
            broadcast,
            websocket,
            location_window,
        }
    }

    /// Upstream port.
    #[must_use]
    pub fn upstream(&self) -> &dyn UpstreamPort {
        self.upstream.as_ref()
    }

    /// Connection registry.
    #[must_use]
    pub fn broadcast(&self) -> &BroadcastManager {
        &self.broadcast
    }

    /// Timing aggregator.
    #[must_use]
    pub const fn aggregator(&self) -> &TimingAggregator {
        &self.aggregator
    }

    /// Session resolver.
    #[must_use]
    pub const fn sessions(&self) -> &SessionResolver {
        &self.sessions
    }

    /// WebSocket settings.
    #[must_use]
    pub const fn websocket(&self) -> &WebSocketSettings {
        &self.websocket
    }

    /// Window used for location lookups.
    #[must_use]
    pub const fn location_window(&self) -> Duration {
        self.location_window
    }

    /// Service version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Time since startup.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("version", &self.version)
            .field("connections", &self.broadcast.count())
            .finish_non_exhaustive()
    }
}

/// Build the router with every route.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(api::root))
        .route("/ws", get(websocket::ws_handler))
        .route("/health", get(health::health_handler))
        .route("/healthz", get(health::liveness_handler))
        .route("/readyz", get(health::readiness_handler))
        .route("/metrics", get(health::metrics_handler))
        .route("/api/sessions/current", get(api::current_session))
        .route("/api/sessions/{session_key}", get(api::session_by_key))
        .route("/api/drivers/{session_key}", get(api::drivers))
        .route("/api/positions/{session_key}", get(api::positions))
        .route("/api/live-timing/{session_key}", get(api::live_timing))
        .route("/api/locations/{session_key}", get(api::locations))
        .route("/api/telemetry/{session_key}", get(api::telemetry))
        .route("/api/pit-stops/{session_key}", get(api::pit_stops))
        .route("/api/weather/{session_key}", get(api::weather))
        .with_state(state)
}

// =============================================================================
// HTTP Server
// =============================================================================

/// The hub's HTTP server.
pub struct HttpServer {
    port: u16,
    state: Arc<AppState>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<AppState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Bind the configured port and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the server encounters
    /// a fatal error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if the server encounters a fatal error.
    pub async fn serve(self, listener: TcpListener) -> Result<(), HttpServerError> {
        let local = listener
            .local_addr()
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;
        tracing::info!(addr = %local, "HTTP server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::application::ports::{Endpoint, HealthSnapshot, MockUpstreamPort};

    fn state_with(upstream: MockUpstreamPort) -> Arc<AppState> {
        Arc::new(AppState::new(
            Arc::new(upstream),
            Arc::new(BroadcastManager::new(Duration::from_secs(1))),
            WebSocketSettings::default(),
            Duration::from_secs(30),
        ))
    }

    async fn call(state: Arc<AppState>, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn root_banner() {
        let (status, body) = call(state_with(MockUpstreamPort::new()), "/").await;
        let body: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn readiness_follows_degradation() {
        let mut healthy = MockUpstreamPort::new();
        healthy.expect_health().returning(HealthSnapshot::default);
        let (status, _) = call(state_with(healthy), "/readyz").await;
        assert_eq!(status, StatusCode::OK);

        let mut degraded = MockUpstreamPort::new();
        degraded.expect_health().returning(|| HealthSnapshot {
            consecutive_failures: 5,
            degraded: true,
            ..HealthSnapshot::default()
        });
        let (status, body) = call(state_with(degraded), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, b"NOT READY");
    }

    #[tokio::test]
    async fn drivers_are_wrapped() {
        let mut upstream = MockUpstreamPort::new();
        upstream
            .expect_fetch()
            .returning(|_, _| vec![json!({"driver_number": 44})]);

        let (status, body) = call(state_with(upstream), "/api/drivers/9158").await;
        let body: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"drivers": [{"driver_number": 44}]}));
    }

    #[tokio::test]
    async fn locations_use_recent_window() {
        let mut upstream = MockUpstreamPort::new();
        upstream
            .expect_fetch()
            .withf(|endpoint, params| {
                *endpoint == Endpoint::Location
                    && params.get("session_key") == Some("9158")
                    && params.get("date").is_some_and(|d| d.starts_with(">="))
            })
            .times(1)
            .returning(|_, _| vec![]);

        let (status, body) = call(state_with(upstream), "/api/locations/9158").await;
        let body: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"locations": []}));
    }
}
