//! OpenF1 HTTP client with TTL cache and health tracking.
//!
//! `fetch` never fails. A fresh cache entry is served without touching the
//! network; otherwise one request is made under a bounded number of
//! permits. Failures are recorded in [`ServiceHealth`] and answered with the
//! last cached data for the same query, or an empty list.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use super::cache::{CacheKey, ResponseCache, ServiceHealth};
use super::error::{ClientBuildError, UpstreamError};
use crate::application::ports::{Endpoint, HealthSnapshot, QueryParams, UpstreamPort};
use crate::domain::timing::UpstreamRecord;
use crate::infrastructure::config::UpstreamSettings;
use crate::infrastructure::metrics::{self, RequestOutcome};

const USER_AGENT: &str = concat!("f1-telemetry-hub/", env!("CARGO_PKG_VERSION"));

/// Cached, health-tracking client for the OpenF1 REST API.
#[derive(Debug)]
pub struct UpstreamClient {
    http: Client,
    base_url: String,
    cache_ttl: Duration,
    max_stale: Duration,
    failure_threshold: u32,
    rate_limit_default: Duration,
    cache: Mutex<ResponseCache>,
    health: Mutex<ServiceHealth>,
    permits: Semaphore,
}

impl UpstreamClient {
    /// Create a client from settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &UpstreamSettings) -> Result<Self, ClientBuildError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(settings.request_timeout)
            .connect_timeout(settings.connect_timeout)
            .pool_max_idle_per_host(settings.max_concurrent)
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            cache_ttl: settings.cache_ttl,
            max_stale: settings.max_stale,
            failure_threshold: settings.failure_threshold,
            rate_limit_default: settings.rate_limit_default,
            cache: Mutex::new(ResponseCache::default()),
            health: Mutex::new(ServiceHealth::default()),
            permits: Semaphore::new(settings.max_concurrent.max(1)),
        })
    }

    /// Fetch `endpoint` records, degrading to cached or empty data.
    pub async fn fetch(&self, endpoint: Endpoint, params: &QueryParams) -> Vec<UpstreamRecord> {
        let key = CacheKey::new(endpoint, params.clone());

        if let Some(data) = self.cached_fresh(&key, endpoint) {
            return data;
        }

        let Ok(_permit) = self.permits.acquire().await else {
            return self.fallback(&key);
        };

        // A concurrent identical miss may have filled the entry while we waited.
        if let Some(data) = self.cached_fresh(&key, endpoint) {
            return data;
        }

        let started = Instant::now();
        let result = self.request(endpoint, params).await;
        let elapsed = started.elapsed();

        match result {
            Ok(data) => {
                metrics::record_upstream_request(endpoint.as_str(), RequestOutcome::Success, elapsed);
                tracing::debug!(
                    endpoint = endpoint.as_str(),
                    params = %params,
                    records = data.len(),
                    elapsed_ms = elapsed.as_millis(),
                    "Upstream request succeeded"
                );

                let now = Instant::now();
                {
                    let mut cache = self.cache.lock();
                    cache.store(key, data.clone(), now);
                    let pruned = cache.prune(self.max_stale, now);
                    if pruned > 0 {
                        tracing::debug!(pruned, "Evicted stale cache entries");
                    }
                }
                self.health.lock().record_success();
                metrics::set_consecutive_failures(0);
                data
            }
            Err(error) => {
                metrics::record_upstream_request(endpoint.as_str(), error.outcome(), elapsed);
                let failures = self.record_failure(&error);
                tracing::warn!(
                    endpoint = endpoint.as_str(),
                    params = %params,
                    error = %error,
                    consecutive_failures = failures,
                    "Upstream request failed, serving cached data"
                );
                self.fallback(&key)
            }
        }
    }

    /// Current health, copied out.
    #[must_use]
    pub fn health(&self) -> HealthSnapshot {
        let cache_entries = self.cache_len();
        self.health
            .lock()
            .snapshot(Instant::now(), self.failure_threshold, cache_entries)
    }

    /// Number of cached responses.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    fn cached_fresh(&self, key: &CacheKey, endpoint: Endpoint) -> Option<Vec<UpstreamRecord>> {
        let data = self.cache.lock().fresh(key, self.cache_ttl, Instant::now())?;
        metrics::record_cache_hit(endpoint.as_str());
        tracing::debug!(endpoint = endpoint.as_str(), "Cache hit");
        Some(data)
    }

    fn fallback(&self, key: &CacheKey) -> Vec<UpstreamRecord> {
        self.cache.lock().latest(key).unwrap_or_default()
    }

    fn record_failure(&self, error: &UpstreamError) -> u32 {
        let failures = {
            let mut health = self.health.lock();
            match error {
                UpstreamError::RateLimited { retry_after } => {
                    health.record_rate_limit(Instant::now() + *retry_after)
                }
                _ => health.record_failure(),
            }
        };
        metrics::set_consecutive_failures(failures);
        failures
    }

    async fn request(
        &self,
        endpoint: Endpoint,
        params: &QueryParams,
    ) -> Result<Vec<UpstreamRecord>, UpstreamError> {
        let url = format!("{}/{}", self.base_url, endpoint.as_str());
        let query: Vec<(&str, &str)> = params.iter().collect();

        let response = self.http.get(&url).query(&query).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(response.headers()).unwrap_or(self.rate_limit_default);
            return Err(UpstreamError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(UpstreamError::Server {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let value: Value = serde_json::from_slice(&body)?;
        Ok(normalize(value))
    }
}

#[async_trait]
impl UpstreamPort for UpstreamClient {
    async fn fetch(&self, endpoint: Endpoint, params: &QueryParams) -> Vec<UpstreamRecord> {
        Self::fetch(self, endpoint, params).await
    }

    fn health(&self) -> HealthSnapshot {
        Self::health(self)
    }
}

/// `Retry-After` in whole seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Arrays pass through, a single object becomes a one-element list, `null`
/// and `{}` become empty.
fn normalize(value: Value) -> Vec<UpstreamRecord> {
    match value {
        Value::Array(records) => records,
        Value::Null => Vec::new(),
        Value::Object(map) if map.is_empty() => Vec::new(),
        other => vec![other],
    }
}
