//! Retry, backoff and timeout behaviour observed through the router.
//!
//! The clock is paused, so backoff sleeps and timeouts advance instantly
//! while keeping their exact spacing.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};

use common::*;

fn gaps(upstream: &ScriptedUpstream) -> Vec<Duration> {
    upstream
        .requests()
        .windows(2)
        .map(|w| w[1].at - w[0].at)
        .collect()
}

fn assert_close(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual < expected + Duration::from_millis(20),
        "expected ~{expected:?}, got {actual:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_persistent_server_error_uses_every_attempt() {
    let upstream = ScriptedUpstream::new();
    upstream.script("https://github.com/", vec![Reply::status(503)]);
    let server = server(test_config(), upstream.clone(), CountingStore::new());

    let response = send(&server.router(), get("/gh/org/repo/file").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(response.headers()["x-cache"], "BYPASS");
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "UPSTREAM_ERROR");
    assert!(body["error"]["message"].as_str().unwrap().contains("503"));

    assert_eq!(upstream.requests().len(), 3);
    let gaps = gaps(&upstream);
    assert_close(gaps[0], Duration::from_millis(100));
    assert_close(gaps[1], Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn test_recovers_when_upstream_comes_back() {
    let upstream = ScriptedUpstream::new();
    upstream.script(
        "https://github.com/",
        vec![Reply::status(502), Reply::Fail, Reply::ok("text/plain", b"finally")],
    );
    let server = server(test_config(), upstream.clone(), CountingStore::new());

    let response = send(&server.router(), get("/gh/org/repo/file").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, "finally");
    assert_eq!(upstream.requests().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_client_error_is_not_retried() {
    let upstream = ScriptedUpstream::new();
    upstream.script("https://github.com/", vec![Reply::status(403)]);
    let server = server(test_config(), upstream.clone(), CountingStore::new());

    let response = send(&server.router(), get("/gh/org/repo/file").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(upstream.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_protocol_server_error_passes_through() {
    let upstream = ScriptedUpstream::new();
    upstream.script(
        "https://github.com/",
        vec![Reply::status(503).with_header("retry-after", "10")],
    );
    let server = server(test_config(), upstream.clone(), CountingStore::new());

    let request = get("/gh/org/repo.git/info/refs?service=git-upload-pack")
        .header("user-agent", "git/2.43.0")
        .body(Body::empty())
        .unwrap();
    let response = send(&server.router(), request).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()["retry-after"], "10");
    assert_eq!(upstream.requests().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_upstream_times_out_per_attempt() {
    let mut config = test_config();
    config.upstream.timeout_secs = 2;
    let upstream = ScriptedUpstream::new();
    upstream.script("https://github.com/", vec![Reply::Hang]);
    let server = server(config, upstream.clone(), CountingStore::new());

    let response = send(&server.router(), get("/gh/org/repo/file").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body_json(response).await["error"]["code"], "UPSTREAM_TIMEOUT");

    // Each attempt waits out its own deadline, then the linear backoff.
    assert_eq!(upstream.requests().len(), 3);
    let gaps = gaps(&upstream);
    assert_close(gaps[0], Duration::from_millis(2100));
    assert_close(gaps[1], Duration::from_millis(2200));
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_upstream_is_bad_gateway() {
    let mut config = test_config();
    config.upstream.max_retries = 2;
    let upstream = ScriptedUpstream::new();
    upstream.script("https://github.com/", vec![Reply::Fail]);
    let server = server(config, upstream.clone(), CountingStore::new());

    let response = send(&server.router(), get("/gh/org/repo/file").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["error"]["code"], "UPSTREAM_UNAVAILABLE");
    assert_eq!(upstream.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_body_is_not_cut_by_the_attempt_deadline() {
    let mut config = test_config();
    config.upstream.timeout_secs = 2;
    let upstream = ScriptedUpstream::new();
    upstream.script(
        "https://github.com/",
        vec![Reply::trickle(
            "application/octet-stream",
            &[b"aa", b"bb", b"cc", b"dd"],
            Duration::from_secs(1),
        )],
    );
    let server = server(config, upstream.clone(), CountingStore::new());

    // Four seconds of body against a two second deadline on headers.
    let response = send(&server.router(), get("/gh/org/repo/big.bin").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, "aabbccdd");
    assert_eq!(upstream.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_inference_response_streams_as_it_arrives() {
    let upstream = ScriptedUpstream::new();
    upstream.script(
        "https://api.openai.com/",
        vec![Reply::trickle(
            "text/event-stream",
            &[b"data: 1\n\n", b"data: 2\n\n", b"data: [DONE]\n\n"],
            Duration::from_secs(10),
        )],
    );
    let server = server(test_config(), upstream.clone(), CountingStore::new());

    let start = tokio::time::Instant::now();
    let request = Request::builder()
        .method("POST")
        .uri("/ip/openai/v1/chat/completions")
        .header("host", "gw.example")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"stream":true}"#))
        .unwrap();
    let response = send(&server.router(), request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(start.elapsed() < Duration::from_secs(10), "headers must not wait for the body");

    assert_eq!(body_bytes(response).await, "data: 1\n\ndata: 2\n\ndata: [DONE]\n\n");
    assert!(start.elapsed() >= Duration::from_secs(30));
    assert_eq!(upstream.requests().len(), 1);
}
