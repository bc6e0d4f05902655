//! Retry, backoff and pacing behavior of the fetcher against a live server

use council_harvest::config::{SourceConfig, ThrottleConfig};
use council_harvest::crawler::{build_http_client, RetryingFetcher};
use std::time::{Duration, Instant};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher(request_delay_ms: u64, max_retries: u32, retry_delay_ms: u64) -> RetryingFetcher {
    let source = SourceConfig {
        timeout_secs: 1,
        ..SourceConfig::default()
    };
    let throttle = ThrottleConfig {
        request_delay_ms,
        batch_delay_ms: 0,
        document_delay_ms: 0,
        max_retries,
        retry_delay_ms,
    };
    RetryingFetcher::new(build_http_client(&source).unwrap(), &throttle)
}

fn url(server: &MockServer, route: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), route)).unwrap()
}

#[tokio::test]
async fn test_always_failing_source_is_tried_max_retries_plus_one() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let mut fetcher = fetcher(0, 3, 20);
    let started = Instant::now();
    let failure = fetcher.fetch(&url(&server, "/broken")).await.unwrap_err();

    // Backoff sleeps 20 + 40 + 80 ms; none after the last attempt
    assert!(started.elapsed() >= Duration::from_millis(140));
    assert_eq!(failure.attempts, 4);
    assert_eq!(failure.reason, "HTTP 500");
    assert_eq!(fetcher.requests_sent(), 4);
    server.verify().await;
}

#[tokio::test]
async fn test_non_ok_status_is_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>ok</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let mut fetcher = fetcher(0, 3, 5);
    let document = fetcher.fetch(&url(&server, "/flaky")).await.unwrap();

    assert_eq!(document.body(), "<p>ok</p>");
    assert_eq!(fetcher.requests_sent(), 2);
    server.verify().await;
}

#[tokio::test]
async fn test_not_found_counts_as_failed_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let mut fetcher = fetcher(0, 1, 5);
    let failure = fetcher.fetch(&url(&server, "/missing")).await.unwrap_err();

    assert_eq!(failure.attempts, 2);
    assert_eq!(failure.reason, "HTTP 404");
    server.verify().await;
}

#[tokio::test]
async fn test_timeout_counts_as_failed_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let mut fetcher = fetcher(0, 1, 5);
    let failure = fetcher.fetch(&url(&server, "/slow")).await.unwrap_err();

    assert_eq!(failure.attempts, 2);
    assert_eq!(failure.reason, "request timeout");
}

#[tokio::test]
async fn test_rate_limit_applies_once_per_logical_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let mut fetcher = fetcher(300, 3, 5);
    fetcher.fetch(&url(&server, "/ok")).await.unwrap();

    let started = Instant::now();
    fetcher.fetch(&url(&server, "/broken")).await.unwrap_err();
    let elapsed = started.elapsed();

    // One 300 ms wait plus 5 + 10 + 20 ms of backoff; a wait per attempt would exceed 1.2 s
    assert!(elapsed >= Duration::from_millis(300), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(900), "elapsed {:?}", elapsed);
    server.verify().await;
}

#[tokio::test]
async fn test_fetch_bytes_returns_raw_body() {
    let server = MockServer::start().await;
    let jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    Mock::given(method("GET"))
        .and(path("/img/a.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(jpeg.clone()),
        )
        .mount(&server)
        .await;

    let mut fetcher = fetcher(0, 0, 0);
    let bytes = fetcher.fetch_bytes(&url(&server, "/img/a.jpg")).await.unwrap();

    assert_eq!(bytes, jpeg);
}
