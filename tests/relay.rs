//! End-to-end tests: mock camera → relay → HTTP clients.

use std::time::Duration;

use axum::http::StatusCode;
use tokio::time::{sleep, timeout, Instant};

mod common;
use common::{parse_parts, relay_config, start_failing_upstream, start_mock_camera, start_relay, CameraScript};

fn finite(frames: Vec<usize>) -> CameraScript {
    CameraScript {
        frames,
        interval: Duration::from_millis(50),
        repeat: false,
        final_chunk: true,
    }
}

fn endless(interval: Duration) -> CameraScript {
    CameraScript {
        frames: vec![64],
        interval,
        repeat: true,
        final_chunk: false,
    }
}

async fn fetch(url: &str) -> reqwest::Response {
    reqwest::Client::new().get(url).send().await.unwrap()
}

async fn collect_parts(response: reqwest::Response) -> Vec<Vec<u8>> {
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    let body = timeout(Duration::from_secs(10), response.bytes())
        .await
        .expect("stream did not end")
        .unwrap();
    parse_parts(&content_type, &body).await
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_frames_relayed_until_final_chunk() {
    let (camera, stats) = start_mock_camera(finite(vec![100, 200, 150])).await;
    let relay = start_relay(relay_config(camera)).await;

    let response = fetch(&relay.url("/cam")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["cache-control"], "no-cache");
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("multipart/x-mixed-replace; boundary="));

    let parts = collect_parts(response).await;
    let sizes: Vec<usize> = parts.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![100, 200, 150]);
    assert!(parts[1].iter().all(|&b| b == 1));
    assert_eq!(stats.authorization(), None);
}

#[tokio::test]
async fn test_credentials_sent_upstream() {
    let (camera, stats) = start_mock_camera(finite(vec![10])).await;
    let mut config = relay_config(camera);
    config.sources[0].username = Some("admin".into());
    config.sources[0].password = Some("secret".into());
    let relay = start_relay(config).await;

    let parts = collect_parts(fetch(&relay.url("/cam")).await).await;
    assert_eq!(parts.len(), 1);
    assert_eq!(stats.authorization().as_deref(), Some("Basic YWRtaW46c2VjcmV0"));
}

#[tokio::test]
async fn test_head_returns_headers_only() {
    let (camera, _) = start_mock_camera(endless(Duration::from_millis(30))).await;
    let relay = start_relay(relay_config(camera)).await;

    let response = reqwest::Client::new()
        .head(relay.url("/cam"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("multipart/x-mixed-replace; boundary="));

    let body = timeout(Duration::from_secs(5), response.bytes()).await.unwrap().unwrap();
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_malformed_query_is_bad_request() {
    let (camera, stats) = start_mock_camera(finite(vec![10])).await;
    let relay = start_relay(relay_config(camera)).await;

    let response = fetch(&relay.url("/cam?fps=%zz")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(stats.connections(), 0);
}

#[tokio::test]
async fn test_client_disconnect_releases_upstream() {
    let (camera, stats) = start_mock_camera(endless(Duration::from_millis(30))).await;
    let mut config = relay_config(camera);
    config.broker.idle_grace_ms = 200;
    let relay = start_relay(config).await;

    let mut response = fetch(&relay.url("/cam")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.chunk().await.unwrap().is_some());
    drop(response);

    wait_for(|| stats.disconnections() == 1).await;
    assert_eq!(stats.connections(), 1);
}

#[tokio::test]
async fn test_shutdown_ends_open_streams() {
    let (camera, _) = start_mock_camera(endless(Duration::from_millis(30))).await;
    let relay = start_relay(relay_config(camera)).await;

    let mut response = fetch(&relay.url("/cam")).await;
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    let mut body = response.chunk().await.unwrap().unwrap().to_vec();

    relay.shutdown.trigger();
    let rest = timeout(Duration::from_secs(5), response.bytes())
        .await
        .expect("stream did not end on shutdown")
        .unwrap();
    body.extend_from_slice(&rest);

    assert!(body.ends_with(b"--\r\n"));
    assert!(!parse_parts(&content_type, &body).await.is_empty());
}

#[tokio::test]
async fn test_high_fps_delivers_every_frame() {
    let (camera, _) = start_mock_camera(finite(vec![100, 200, 150])).await;
    let relay = start_relay(relay_config(camera)).await;

    let response = fetch(&relay.url("/cam?fps=1000000")).await;
    let sizes: Vec<usize> = collect_parts(response).await.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![100, 200, 150]);
}

#[tokio::test]
async fn test_fps_throttles_delivery() {
    let (camera, _) = start_mock_camera(endless(Duration::from_millis(40))).await;
    let mut config = relay_config(camera);
    config.sources[0].stream_duration_secs = 1.2;
    let relay = start_relay(config).await;

    let (throttled, unthrottled) = tokio::join!(
        async { collect_parts(fetch(&relay.url("/cam?fps=2")).await).await },
        async { collect_parts(fetch(&relay.url("/cam")).await).await },
    );

    assert!(
        (2..=4).contains(&throttled.len()),
        "throttled client got {} frames",
        throttled.len()
    );
    assert!(
        unthrottled.len() > throttled.len() * 2,
        "unthrottled client got {} frames",
        unthrottled.len()
    );
}

#[tokio::test]
async fn test_stream_duration_ends_response() {
    let (camera, _) = start_mock_camera(endless(Duration::from_millis(50))).await;
    let mut config = relay_config(camera);
    config.sources[0].stream_duration_secs = 0.5;
    let relay = start_relay(config).await;

    let started = Instant::now();
    let parts = collect_parts(fetch(&relay.url("/cam")).await).await;
    let elapsed = started.elapsed();

    assert!(!parts.is_empty());
    assert!(elapsed >= Duration::from_millis(450), "ended after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(3), "ended after {:?}", elapsed);
}

#[tokio::test]
async fn test_failing_upstream_is_unavailable() {
    let upstream = start_failing_upstream(500).await;
    let relay = start_relay(relay_config(upstream)).await;

    let response = fetch(&relay.url("/cam")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.text().await.unwrap(), "Stream failed");
}

#[tokio::test]
async fn test_unsupported_method() {
    let (camera, stats) = start_mock_camera(finite(vec![10])).await;
    let relay = start_relay(relay_config(camera)).await;

    let response = reqwest::Client::new()
        .post(relay.url("/cam"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()["allow"], "GET, HEAD");
    assert_eq!(stats.connections(), 0);
}

#[tokio::test]
async fn test_clients_share_one_upstream_connection() {
    let (camera, stats) = start_mock_camera(endless(Duration::from_millis(30))).await;
    let mut config = relay_config(camera);
    config.sources[0].stream_duration_secs = 0.5;
    config.broker.idle_grace_ms = 200;
    let relay = start_relay(config).await;

    let (a, b, c) = tokio::join!(
        async { collect_parts(fetch(&relay.url("/cam")).await).await },
        async { collect_parts(fetch(&relay.url("/cam")).await).await },
        async { collect_parts(fetch(&relay.url("/cam?fps=5")).await).await },
    );
    assert!(!a.is_empty() && !b.is_empty() && !c.is_empty());
    assert_eq!(stats.connections(), 1);

    // Upstream is released once the grace delay passes without clients
    wait_for(|| stats.disconnections() == 1).await;

    let again = collect_parts(fetch(&relay.url("/cam")).await).await;
    assert!(!again.is_empty());
    assert_eq!(stats.connections(), 2);
}

#[tokio::test]
async fn test_client_returning_within_grace_reuses_upstream() {
    let (camera, stats) = start_mock_camera(endless(Duration::from_millis(30))).await;
    let mut config = relay_config(camera);
    config.sources[0].stream_duration_secs = 0.3;
    config.broker.idle_grace_ms = 5_000;
    let relay = start_relay(config).await;

    assert!(!collect_parts(fetch(&relay.url("/cam")).await).await.is_empty());
    assert!(!collect_parts(fetch(&relay.url("/cam")).await).await.is_empty());

    assert_eq!(stats.connections(), 1);
    assert_eq!(stats.disconnections(), 0);
}
