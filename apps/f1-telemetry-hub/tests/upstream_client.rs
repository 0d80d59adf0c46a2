//! Upstream Client Integration Tests
//!
//! Drives `UpstreamClient` against a local mock of the OpenF1 API to check
//! caching, rate-limit handling and degradation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::{Duration, Instant};

use futures::future::join_all;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use f1_telemetry_hub::{Endpoint, QueryParams, UpstreamClient, UpstreamSettings};

fn settings_for(server: &MockServer, cache_ttl: Duration) -> UpstreamSettings {
    UpstreamSettings {
        base_url: server.uri(),
        cache_ttl,
        failure_threshold: 2,
        request_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(2),
        ..UpstreamSettings::default()
    }
}

fn client_for(server: &MockServer, cache_ttl: Duration) -> UpstreamClient {
    UpstreamClient::new(&settings_for(server, cache_ttl)).unwrap()
}

fn drivers_body() -> serde_json::Value {
    json!([
        {"driver_number": 44, "name_acronym": "HAM", "team_name": "Mercedes"},
        {"driver_number": 1, "name_acronym": "VER", "team_name": "Red Bull Racing"}
    ])
}

#[tokio::test]
async fn repeated_fetch_within_ttl_hits_upstream_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drivers"))
        .and(query_param("session_key", "9158"))
        .respond_with(ResponseTemplate::new(200).set_body_json(drivers_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(60));
    let params = QueryParams::session(9158);

    let first = client.fetch(Endpoint::Drivers, &params).await;
    let second = client.fetch(Endpoint::Drivers, &params).await;

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
    assert_eq!(client.cache_len(), 1);
}

#[tokio::test]
async fn expired_entry_is_refetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drivers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(drivers_body()))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_millis(50));
    let params = QueryParams::session(9158);

    client.fetch(Endpoint::Drivers, &params).await;
    tokio::time::sleep(Duration::from_millis(120)).await;
    client.fetch(Endpoint::Drivers, &params).await;
}

#[tokio::test]
async fn different_params_are_cached_separately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/position"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(60));

    client.fetch(Endpoint::Position, &QueryParams::session(1)).await;
    client.fetch(Endpoint::Position, &QueryParams::session(2)).await;

    assert_eq!(client.cache_len(), 2);
}

#[tokio::test]
async fn rate_limit_serves_last_cached_value() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drivers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(drivers_body()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drivers"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_millis(10));
    let params = QueryParams::session(9158);

    let fresh = client.fetch(Endpoint::Drivers, &params).await;
    tokio::time::sleep(Duration::from_millis(40)).await;
    let limited = client.fetch(Endpoint::Drivers, &params).await;

    assert_eq!(fresh, limited);

    let health = client.health();
    assert!(health.rate_limited);
    assert_eq!(health.consecutive_failures, 1);
    assert!(health.rate_limited_for_secs.is_some_and(|secs| secs > 0 && secs <= 30));
}

#[tokio::test]
async fn server_errors_degrade_to_empty_and_count_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));

    assert!(client.fetch(Endpoint::Laps, &QueryParams::session(1)).await.is_empty());
    assert!(!client.health().degraded);

    assert!(client.fetch(Endpoint::Stints, &QueryParams::session(1)).await.is_empty());
    let health = client.health();
    assert_eq!(health.consecutive_failures, 2);
    assert!(health.degraded);
    assert!(!health.rate_limited);
}

#[tokio::test]
async fn success_resets_failure_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/laps"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drivers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(drivers_body()))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));

    client.fetch(Endpoint::Laps, &QueryParams::session(1)).await;
    assert_eq!(client.health().consecutive_failures, 1);

    client.fetch(Endpoint::Drivers, &QueryParams::session(1)).await;
    assert_eq!(client.health().consecutive_failures, 0);
}

#[tokio::test]
async fn single_object_body_becomes_one_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sessions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"session_key": 9158, "session_name": "Race"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));
    let records = client
        .fetch(Endpoint::Sessions, &QueryParams::new().with("session_key", "latest"))
        .await;

    assert_eq!(records, vec![json!({"session_key": 9158, "session_name": "Race"})]);
}

#[tokio::test]
async fn invalid_json_counts_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));

    assert!(client.fetch(Endpoint::Weather, &QueryParams::session(1)).await.is_empty());
    assert_eq!(client.health().consecutive_failures, 1);
}

#[tokio::test]
async fn success_elsewhere_keeps_rate_limit_window() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/position"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "60"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/intervals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5));

    client.fetch(Endpoint::Position, &QueryParams::session(1)).await;
    client.fetch(Endpoint::Intervals, &QueryParams::session(1)).await;

    let health = client.health();
    assert_eq!(health.consecutive_failures, 0);
    assert!(health.rate_limited);
    assert!(health.rate_limited_for_secs.is_some_and(|secs| secs > 50));
}

#[tokio::test]
async fn concurrent_identical_misses_share_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drivers"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(drivers_body())
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = UpstreamClient::new(&UpstreamSettings {
        max_concurrent: 1,
        ..settings_for(&server, Duration::from_secs(60))
    })
    .unwrap();
    let params = QueryParams::session(9158);

    let results = join_all((0..5).map(|_| client.fetch(Endpoint::Drivers, &params))).await;

    assert!(results.iter().all(|records| records.len() == 2));
}

#[tokio::test]
async fn in_flight_requests_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/laps"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(6)
        .mount(&server)
        .await;

    let client = UpstreamClient::new(&UpstreamSettings {
        max_concurrent: 2,
        ..settings_for(&server, Duration::from_secs(60))
    })
    .unwrap();
    let queries: Vec<_> = (1..=6).map(QueryParams::session).collect();

    let started = Instant::now();
    join_all(queries.iter().map(|params| client.fetch(Endpoint::Laps, params))).await;
    let elapsed = started.elapsed();

    // Six requests through two permits take at least three delay rounds.
    assert!(elapsed >= Duration::from_millis(590), "{elapsed:?}");
    assert_eq!(client.cache_len(), 6);
}
