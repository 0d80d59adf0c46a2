//! Hub Configuration Settings
//!
//! Configuration types for the telemetry hub, loaded from environment
//! variables. Malformed numeric values fall back to their defaults; values
//! the service cannot run with are rejected.

use std::time::Duration;

use reqwest::Url;

/// Public OpenF1 API root.
pub const DEFAULT_OPENF1_BASE_URL: &str = "https://api.openf1.org/v1";

/// OpenF1 client and cache settings.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// API root, without trailing slash.
    pub base_url: String,
    /// How long a cached response is served without a network call.
    pub cache_ttl: Duration,
    /// Age after which cache entries are evicted.
    pub max_stale: Duration,
    /// Maximum concurrent upstream requests.
    pub max_concurrent: usize,
    /// Total request timeout.
    pub request_timeout: Duration,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Consecutive failures after which upstream counts as degraded.
    pub failure_threshold: u32,
    /// Rate-limit window assumed when a 429 carries no `Retry-After`.
    pub rate_limit_default: Duration,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENF1_BASE_URL.to_string(),
            cache_ttl: Duration::from_secs(5),
            max_stale: Duration::from_secs(600),
            max_concurrent: 5,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            failure_threshold: 5,
            rate_limit_default: Duration::from_secs(60),
        }
    }
}

/// Streaming scheduler timings.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Re-check interval while nobody is connected.
    pub idle_interval: Duration,
    /// Wait after each broadcast cycle.
    pub poll_interval: Duration,
    /// Pause between the fetches of one cycle.
    pub stagger_delay: Duration,
    /// Base delay for failure backoff.
    pub short_backoff: Duration,
    /// Cap for failure backoff and minimum rate-limit wait.
    pub long_backoff: Duration,
    /// How far back location queries reach.
    pub location_window: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_secs(5),
            poll_interval: Duration::from_secs(10),
            stagger_delay: Duration::from_secs(1),
            short_backoff: Duration::from_secs(15),
            long_backoff: Duration::from_secs(120),
            location_window: Duration::from_secs(30),
        }
    }
}

/// Subscriber connection settings.
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    /// Idle time before a heartbeat is pushed to a silent client.
    pub heartbeat_interval: Duration,
    /// Maximum time a single send may wait on a full outbound queue.
    pub send_timeout: Duration,
    /// Outbound queue length per connection.
    pub outbound_capacity: usize,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            send_timeout: Duration::from_secs(5),
            outbound_capacity: 64,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// HTTP port serving `/ws`, health, metrics and the read API.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 8000 }
    }
}

/// Complete hub configuration.
#[derive(Debug, Clone, Default)]
pub struct HubConfig {
    /// Upstream client settings.
    pub upstream: UpstreamSettings,
    /// Scheduler timings.
    pub scheduler: SchedulerSettings,
    /// Subscriber connection settings.
    pub websocket: WebSocketSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl HubConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but unusable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let upstream_defaults = UpstreamSettings::default();
        let base_url = env
            .string("OPENF1_BASE_URL")
            .unwrap_or(upstream_defaults.base_url);
        let upstream = UpstreamSettings {
            base_url: validate_base_url("OPENF1_BASE_URL", &base_url)?,
            cache_ttl: env.secs("HUB_CACHE_TTL_SECS", upstream_defaults.cache_ttl),
            max_stale: env.secs("HUB_CACHE_MAX_STALE_SECS", upstream_defaults.max_stale),
            max_concurrent: non_zero(
                "HUB_UPSTREAM_MAX_CONCURRENT",
                env.parse("HUB_UPSTREAM_MAX_CONCURRENT", upstream_defaults.max_concurrent),
            )?,
            request_timeout: env.secs(
                "HUB_UPSTREAM_TIMEOUT_SECS",
                upstream_defaults.request_timeout,
            ),
            connect_timeout: env.secs(
                "HUB_UPSTREAM_CONNECT_TIMEOUT_SECS",
                upstream_defaults.connect_timeout,
            ),
            failure_threshold: env.parse(
                "HUB_FAILURE_THRESHOLD",
                upstream_defaults.failure_threshold,
            ),
            rate_limit_default: env.secs(
                "HUB_RATE_LIMIT_DEFAULT_SECS",
                upstream_defaults.rate_limit_default,
            ),
        };

        let scheduler_defaults = SchedulerSettings::default();
        let scheduler = SchedulerSettings {
            idle_interval: env.secs("HUB_IDLE_INTERVAL_SECS", scheduler_defaults.idle_interval),
            poll_interval: env.secs("HUB_POLL_INTERVAL_SECS", scheduler_defaults.poll_interval),
            stagger_delay: env.millis("HUB_STAGGER_DELAY_MS", scheduler_defaults.stagger_delay),
            short_backoff: env.secs("HUB_SHORT_BACKOFF_SECS", scheduler_defaults.short_backoff),
            long_backoff: env.secs("HUB_LONG_BACKOFF_SECS", scheduler_defaults.long_backoff),
            location_window: env.secs(
                "HUB_LOCATION_WINDOW_SECS",
                scheduler_defaults.location_window,
            ),
        };

        let websocket_defaults = WebSocketSettings::default();
        let websocket = WebSocketSettings {
            heartbeat_interval: env.secs(
                "HUB_HEARTBEAT_INTERVAL_SECS",
                websocket_defaults.heartbeat_interval,
            ),
            send_timeout: env.millis("HUB_SEND_TIMEOUT_MS", websocket_defaults.send_timeout),
            outbound_capacity: non_zero(
                "HUB_OUTBOUND_CAPACITY",
                env.parse("HUB_OUTBOUND_CAPACITY", websocket_defaults.outbound_capacity),
            )?,
        };

        let server = ServerSettings {
            http_port: env.parse("HUB_HTTP_PORT", ServerSettings::default().http_port),
        };

        Ok(Self {
            upstream,
            scheduler,
            websocket,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A URL setting could not be used.
    #[error("invalid URL in {key}: {reason}")]
    InvalidUrl {
        /// Variable name.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
    /// A setting that must be positive was zero.
    #[error("environment variable {0} must be greater than zero")]
    ZeroValue(String),
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.string(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        self.string(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        self.string(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}

fn validate_base_url(key: &str, raw: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        key: key.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn non_zero(key: &str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::ZeroValue(key.to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_with(vars: &[(&str, &str)]) -> Result<HubConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        HubConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config_with(&[]).unwrap();

        assert_eq!(config.upstream.base_url, DEFAULT_OPENF1_BASE_URL);
        assert_eq!(config.upstream.cache_ttl, Duration::from_secs(5));
        assert_eq!(config.upstream.max_concurrent, 5);
        assert_eq!(config.upstream.failure_threshold, 5);
        assert_eq!(config.scheduler.poll_interval, Duration::from_secs(10));
        assert_eq!(config.scheduler.stagger_delay, Duration::from_millis(1000));
        assert_eq!(config.scheduler.long_backoff, Duration::from_secs(120));
        assert_eq!(config.websocket.outbound_capacity, 64);
        assert_eq!(config.server.http_port, 8000);
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_with(&[
            ("OPENF1_BASE_URL", "http://localhost:9000/v1/"),
            ("HUB_CACHE_TTL_SECS", "2"),
            ("HUB_STAGGER_DELAY_MS", "250"),
            ("HUB_HTTP_PORT", "8080"),
        ])
        .unwrap();

        assert_eq!(config.upstream.base_url, "http://localhost:9000/v1");
        assert_eq!(config.upstream.cache_ttl, Duration::from_secs(2));
        assert_eq!(config.scheduler.stagger_delay, Duration::from_millis(250));
        assert_eq!(config.server.http_port, 8080);
    }

    #[test]
    fn malformed_numbers_fall_back() {
        let config = config_with(&[("HUB_POLL_INTERVAL_SECS", "soon"), ("HUB_HTTP_PORT", "-1")])
            .unwrap();

        assert_eq!(config.scheduler.poll_interval, Duration::from_secs(10));
        assert_eq!(config.server.http_port, 8000);
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            config_with(&[("OPENF1_BASE_URL", "not a url")]),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            config_with(&[("OPENF1_BASE_URL", "ftp://example.com")]),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            config_with(&[("HUB_OUTBOUND_CAPACITY", "0")]),
            Err(ConfigError::ZeroValue(_))
        ));
        assert!(matches!(
            config_with(&[("HUB_UPSTREAM_MAX_CONCURRENT", "0")]),
            Err(ConfigError::ZeroValue(_))
        ));
    }
}
