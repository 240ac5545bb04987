//! Admission scenarios driven end to end over TLS.

use std::time::Duration;

use policy_webhook::webhooks::{
    AdmissionReview, DynamicObject, MUTATING_WEBHOOK_PATH, POLICY_VALIDATING_WEBHOOK_PATH,
    VALIDATING_WEBHOOK_PATH,
};
use policy_webhook::Handlers;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;

use crate::common::fixtures::{ReviewBuilder, SpyHandler, Spies};
use crate::harness::{TestServer, client};

const GRACE: Duration = Duration::from_secs(5);

async fn post(
    server: &TestServer,
    path: &str,
    content_type: Option<&str>,
    body: Vec<u8>,
) -> reqwest::Response {
    let mut request = client().post(server.url(path)).body(body);
    if let Some(content_type) = content_type {
        request = request.header(CONTENT_TYPE, content_type);
    }
    request.send().await.unwrap()
}

async fn review(response: reqwest::Response) -> AdmissionReview<DynamicObject> {
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[CONTENT_TYPE],
        "application/json; charset=utf-8"
    );
    serde_json::from_slice(&response.bytes().await.unwrap()).unwrap()
}

/// Mutation path, ConfigMap not filtered, handler denies with "forbidden".
#[tokio::test]
async fn test_mutation_denied_configmap() {
    let mutation = SpyHandler::denying("forbidden");
    let spies = Spies {
        mutation: mutation.clone(),
        ..Spies::allowing()
    };
    let server = TestServer::start(&["Pod"], spies.handlers()).await;

    let body = ReviewBuilder::new("cm-uid-1")
        .kind("", "v1", "ConfigMap")
        .namespace("default")
        .to_bytes();
    let response = post(&server, MUTATING_WEBHOOK_PATH, Some("application/json"), body).await;

    let response = review(response).await.response.unwrap();
    assert!(!response.allowed);
    assert_eq!(response.uid, "cm-uid-1");
    assert_eq!(response.result.message, "forbidden");
    assert_eq!(mutation.calls(), 1);
    assert_eq!(spies.validation.calls(), 0);
    assert_eq!(spies.policy_validation.calls(), 0);

    server.server.stop(GRACE).await;
}

/// Policy-validation path, Pod filtered: default allow, no handler side effects.
#[tokio::test]
async fn test_policy_validation_filtered_pod() {
    let spies = Spies {
        policy_validation: SpyHandler::denying("should not run"),
        ..Spies::allowing()
    };
    let server = TestServer::start(&["Pod"], spies.handlers()).await;

    let body = ReviewBuilder::new("pod-uid-9")
        .kind("", "v1", "Pod")
        .to_bytes();
    let response = post(
        &server,
        POLICY_VALIDATING_WEBHOOK_PATH,
        Some("application/json"),
        body,
    )
    .await;

    let response = review(response).await.response.unwrap();
    assert!(response.allowed);
    assert_eq!(response.uid, "pod-uid-9");
    assert_eq!(spies.total_calls(), 0);

    let metrics = server.metrics.encode();
    assert!(metrics.contains(r#"webhook_admission_filtered_total{route="policy-validation"} 1"#));

    server.server.stop(GRACE).await;
}

/// The response UID always comes from the request, never from the handler.
#[tokio::test]
async fn test_uid_echoed_on_every_route() {
    let spies = Spies::allowing();
    let server = TestServer::start(&[], spies.handlers()).await;

    for (i, path) in [
        MUTATING_WEBHOOK_PATH,
        VALIDATING_WEBHOOK_PATH,
        POLICY_VALIDATING_WEBHOOK_PATH,
    ]
    .into_iter()
    .enumerate()
    {
        let uid = format!("uid-{i}");
        let body = ReviewBuilder::new(uid.clone()).to_bytes();
        let response = post(&server, path, Some("application/json"), body).await;
        assert_eq!(review(response).await.response.unwrap().uid, uid);
    }
    assert_eq!(spies.total_calls(), 3);

    server.server.stop(GRACE).await;
}

#[tokio::test]
async fn test_malformed_requests_get_specific_status() {
    let spies = Spies::allowing();
    let server = TestServer::start(&[], spies.handlers()).await;
    let valid = ReviewBuilder::new("uid").to_bytes();

    let empty = post(&server, VALIDATING_WEBHOOK_PATH, Some("application/json"), Vec::new()).await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    assert_eq!(empty.text().await.unwrap(), "empty body");

    let yaml = post(&server, VALIDATING_WEBHOOK_PATH, Some("application/yaml"), valid.clone()).await;
    assert_eq!(yaml.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let missing = post(&server, VALIDATING_WEBHOOK_PATH, None, valid).await;
    assert_eq!(missing.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let garbage = post(
        &server,
        VALIDATING_WEBHOOK_PATH,
        Some("application/json"),
        b"{\"request\": 42".to_vec(),
    )
    .await;
    assert_eq!(garbage.status(), StatusCode::EXPECTATION_FAILED);

    assert_eq!(spies.total_calls(), 0);
    server.server.stop(GRACE).await;
}

#[tokio::test]
async fn test_unregistered_path_not_found() {
    let handler = SpyHandler::denying("no");
    let server = TestServer::start(
        &[],
        Handlers::new(handler.clone(), handler.clone(), handler.clone()),
    )
    .await;

    let body = ReviewBuilder::new("uid").to_bytes();
    let response = post(&server, "/mutate/extra", Some("application/json"), body).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(handler.calls(), 0);

    server.server.stop(GRACE).await;
}
