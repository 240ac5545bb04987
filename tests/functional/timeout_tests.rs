//! Per-request read and write timeouts.

use std::time::{Duration, Instant};

use futures::StreamExt;
use policy_webhook::webhooks::{MUTATING_WEBHOOK_PATH, ServerSettings, VALIDATING_WEBHOOK_PATH};
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;

use crate::common::fixtures::{ReviewBuilder, SpyHandler, Spies};
use crate::harness::{TestServer, client};

const SHORT: Duration = Duration::from_millis(200);
const LONG: Duration = Duration::from_secs(5);

fn settings(read_timeout: Duration, write_timeout: Duration) -> ServerSettings {
    ServerSettings {
        read_timeout,
        write_timeout,
        ..ServerSettings::default()
    }
}

#[tokio::test]
async fn test_stalled_body_times_out() {
    let spies = Spies::allowing();
    let server = TestServer::start_with(settings(SHORT, LONG), &[], spies.handlers()).await;

    // First chunk arrives, the rest never does
    let stalled = futures::stream::once(async { Ok::<_, std::io::Error>(b"{\"request\":".to_vec()) })
        .chain(futures::stream::pending());

    let started = Instant::now();
    let response = tokio::time::timeout(
        LONG,
        client()
            .post(server.url(MUTATING_WEBHOOK_PATH))
            .header(CONTENT_TYPE, "application/json")
            .body(reqwest::Body::wrap_stream(stalled))
            .send(),
    )
    .await
    .expect("stalled request was never answered")
    .unwrap();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert!(started.elapsed() < LONG);
    assert_eq!(spies.total_calls(), 0);
    assert!(
        server
            .metrics
            .encode()
            .contains(r#"webhook_admission_rejections_total{status="408"} 1"#)
    );

    server.server.stop(LONG).await;
}

#[tokio::test]
async fn test_slow_handler_times_out() {
    let slow = SpyHandler::slow(Duration::from_secs(3));
    let spies = Spies {
        validation: slow.clone(),
        ..Spies::allowing()
    };
    let server = TestServer::start_with(settings(LONG, SHORT), &[], spies.handlers()).await;

    let started = Instant::now();
    let response = client()
        .post(server.url(VALIDATING_WEBHOOK_PATH))
        .header(CONTENT_TYPE, "application/json")
        .body(ReviewBuilder::new("slow-uid").to_bytes())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(slow.calls(), 1);

    server.server.stop(LONG).await;
}
