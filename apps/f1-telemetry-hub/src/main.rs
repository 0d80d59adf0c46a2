//! F1 Telemetry Hub Binary
//!
//! Starts the upstream client, the streaming scheduler and the HTTP /
//! WebSocket server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin f1-telemetry-hub
//! ```
//!
//! # Environment Variables
//!
//! - `OPENF1_BASE_URL`: OpenF1 API base (default: <https://api.openf1.org/v1>)
//! - `HUB_HTTP_PORT`: HTTP and WebSocket port (default: 8000)
//! - `HUB_*`: cache, backoff, scheduler and WebSocket tuning
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use f1_telemetry_hub::infrastructure::telemetry;
use f1_telemetry_hub::{
    AppState, BroadcastManager, HttpServer, HubConfig, StreamingScheduler, UpstreamClient,
    init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "failed to install rustls crypto provider")?;

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting F1 Telemetry Hub");

    let _metrics_handle = init_metrics();

    let config = HubConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let upstream = Arc::new(UpstreamClient::new(&config.upstream)?);
    let broadcast = Arc::new(BroadcastManager::new(config.websocket.send_timeout));

    let scheduler = StreamingScheduler::new(
        upstream.clone(),
        broadcast.clone(),
        config.scheduler.clone(),
        config.upstream.failure_threshold,
    );
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_token.clone()));

    let state = Arc::new(AppState::new(
        upstream,
        Arc::clone(&broadcast),
        config.websocket.clone(),
        config.scheduler.location_window,
    ));
    let http_server = HttpServer::new(config.server.http_port, state, shutdown_token.clone());
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tracing::info!("Telemetry hub ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, scheduler_task)
        .await
        .is_err()
    {
        tracing::warn!("Scheduler did not stop within the shutdown timeout");
    }

    let closed = broadcast.close_all();
    tracing::info!(closed, "Subscriber connections closed");

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, http_task).await.is_err() {
        tracing::warn!("HTTP server did not drain within the shutdown timeout");
    }

    tracing::info!("Telemetry hub stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &HubConfig) {
    tracing::info!(
        base_url = %config.upstream.base_url,
        http_port = config.server.http_port,
        cache_ttl_secs = config.upstream.cache_ttl.as_secs(),
        max_concurrent = config.upstream.max_concurrent,
        poll_interval_secs = config.scheduler.poll_interval.as_secs(),
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.is_file() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Wait for Ctrl+C or SIGTERM, then cancel `shutdown_token`.
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
