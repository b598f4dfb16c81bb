//! Integration tests for the fetch gateway
//!
//! These verify coalescing (one transport call no matter how many
//! concurrent callers), the response cache, robots.txt compliance, the
//! hard timeout, and URL normalization.

mod common;

use common::quick_request_manager;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use watcher::{Metrics, RequestManager};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn concurrent_fetches_collapse_onto_one_transport_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html>payload</html>")
                .set_delay(Duration::from_millis(500)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = Arc::new(quick_request_manager(Arc::new(Metrics::new())));
    let url = format!("{}/api", server.uri());

    let fetches = (0..10).map(|_| {
        let manager = manager.clone();
        let url = url.clone();
        async move { manager.fetch(&url).await }
    });
    let results = join_all(fetches).await;

    assert_eq!(results.len(), 10);
    for result in &results {
        assert!(result.is_success(), "unexpected error: {:?}", result.error);
        assert_eq!(result.status_code, 200);
        assert_eq!(result.content.as_deref(), Some("<html>payload</html>"));
    }
    // Mock expectation (exactly one hit) verifies on drop.
}

#[tokio::test]
async fn repeat_fetch_within_ttl_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("cached"))
        .expect(1)
        .mount(&server)
        .await;

    let manager = quick_request_manager(Arc::new(Metrics::new()));
    let url = format!("{}/page", server.uri());

    let first = manager.fetch(&url).await;
    let second = manager.fetch(&url).await;
    assert!(first.is_success());
    assert!(second.is_success());
    assert_eq!(first.content, second.content);
}

#[tokio::test]
async fn slow_transport_hits_the_hard_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let manager = quick_request_manager(Arc::new(Metrics::new()));
    let url = format!("{}/slow", server.uri());

    let started = Instant::now();
    let result = manager.fetch(&url).await;
    assert!(started.elapsed() < Duration::from_secs(4));
    let error = result.error.expect("timeout must surface as an error");
    assert!(error.contains("Hard Timeout"), "got: {}", error);
    assert_eq!(result.status_code, 0);
    assert!(result.content.is_none());
}

#[tokio::test]
async fn robots_disallow_blocks_the_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private/report"))
        .respond_with(ResponseTemplate::new(200).set_body_string("secret"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/public"))
        .respond_with(ResponseTemplate::new(200).set_body_string("open"))
        .mount(&server)
        .await;

    let manager = quick_request_manager(Arc::new(Metrics::new()));

    let blocked = manager
        .fetch(&format!("{}/private/report", server.uri()))
        .await;
    let error = blocked.error.expect("robots block must surface as error");
    assert!(error.contains("Blocked by Robots.txt"), "got: {}", error);

    let allowed = manager.fetch(&format!("{}/public", server.uri())).await;
    assert!(allowed.is_success());
    assert_eq!(allowed.content.as_deref(), Some("open"));
}

#[tokio::test]
async fn rate_limited_response_passes_through_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let manager = quick_request_manager(Arc::new(Metrics::new()));
    let result = manager.fetch(&format!("{}/busy", server.uri())).await;

    assert_eq!(result.status_code, 429);
    assert!(result.error.is_none());
    assert_eq!(result.content.as_deref(), Some("slow down"));
}

#[test]
fn normalization_strips_tracking_params_and_sorts_the_rest() {
    let normalized = RequestManager::normalize_url(
        "HTTPS://Example.COM/path?utm_source=mail&b=2&a=1&fbclid=xyz&gclid=abc",
    );
    assert_eq!(normalized, "https://example.com/path?a=1&b=2");
}

#[test]
fn normalization_is_idempotent_and_order_invariant() {
    let one = RequestManager::normalize_url("https://example.com/x?b=2&a=1&utm_medium=social");
    let two = RequestManager::normalize_url("https://example.com/x?a=1&utm_campaign=c&b=2");
    assert_eq!(one, two);
    assert_eq!(RequestManager::normalize_url(&one), one);
}

#[test]
fn normalization_drops_an_all_tracking_query() {
    let normalized =
        RequestManager::normalize_url("https://example.com/page?utm_source=a&utm_term=b");
    assert_eq!(normalized, "https://example.com/page");
}
