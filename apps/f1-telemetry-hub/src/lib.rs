#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! F1 Telemetry Hub - Live Timing Aggregator
//!
//! Polls the OpenF1 REST API through a cached, rate-limit-aware client,
//! merges its time-series endpoints into per-driver timing snapshots, and
//! fans position, interval and location updates out to WebSocket clients.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `timing`: Upstream records, formatting, snapshot merge
//!   - `subscription`: Connection ids, topics, subscription sets
//!   - `streaming`: Outbound envelopes and client control messages
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `UpstreamPort`, `BroadcastPort`
//!   - `services`: Timing aggregator, session resolver, streaming scheduler
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `openf1`: Cached REST client
//!   - `broadcast`: Connection registry and fan-out
//!   - `http` / `websocket`: Axum server and client sessions
//!   - `config`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!              ┌──────────────┐     ┌────────────┐     ┌────────────┐
//! OpenF1 ◄─────│ UpstreamClient│◄────│ Scheduler  │────►│ Broadcast  │──► Client 1
//!   REST       │  (TTL cache) │     │ (poll loop)│     │  Manager   │──► Client N
//!              └──────────────┘     └────────────┘     └────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no external I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::streaming::{ClientMessage, Envelope, MessageType};
pub use domain::subscription::{ConnectionId, SubscriptionSet, Topic};
pub use domain::timing::{DriverTimingSnapshot, UpstreamRecord};

// Ports and services
pub use application::ports::{BroadcastPort, Endpoint, HealthSnapshot, QueryParams, UpstreamPort};
pub use application::services::{
    AggregationError, SessionResolver, StreamingScheduler, TimingAggregator, TimingBoard,
};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, HubConfig, SchedulerSettings, ServerSettings, UpstreamSettings,
    WebSocketSettings,
};

// Adapters (for integration tests)
pub use infrastructure::broadcast::{BroadcastManager, Connection, SendError};
pub use infrastructure::http::{AppState, HttpServer, HttpServerError};
pub use infrastructure::openf1::UpstreamClient;

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
