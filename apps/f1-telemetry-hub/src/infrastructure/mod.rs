//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the HTTP and WebSocket surface.

/// Connection registry and WebSocket fan-out.
pub mod broadcast;

/// Environment-driven configuration.
pub mod config;

/// HTTP server: health, metrics and JSON read routes.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Cached, rate-limit-aware OpenF1 REST client.
pub mod openf1;

/// OpenTelemetry tracing integration.
pub mod telemetry;

/// WebSocket session handling.
pub mod websocket;
