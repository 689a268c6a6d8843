//! Identity-service backed quota checks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use toolstream::error::ToolError;
use toolstream::quota::{HttpQuotaStore, QuotaDecision, QuotaGuard, QuotaStore};
use toolstream::tools::ToolName;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn snapshot_is_read_from_identity_service() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/u1/usage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"tool": "searchWeb", "used": 10, "limit": 10, "windowEnd": "2999-01-01T00:00:00Z"},
            {"tool": "getWeather", "used": 1, "limit": 10}
        ])))
        .mount(&server)
        .await;

    let store = Arc::new(HttpQuotaStore::new(&server.uri(), reqwest::Client::new()));
    let snapshot = store.usage_snapshot("u1").await.expect("snapshot");
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].tool, "searchWeb");

    let guard = QuotaGuard::new(store, 1.0);
    assert_eq!(
        guard.authorize("u1", ToolName::SearchWeb).await,
        QuotaDecision::Deny(ToolError::QuotaDenied("searchWeb".into()))
    );
    assert!(guard.authorize("u1", ToolName::GetWeather).await.is_allowed());
    // no record: unmetered
    assert!(guard.authorize("u1", ToolName::GetStockPrice).await.is_allowed());
}

#[tokio::test]
async fn expired_window_counts_as_reset() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/u1/usage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"tool": "searchWeb", "used": 99, "limit": 10, "windowEnd": "2001-01-01T00:00:00Z"}
        ])))
        .mount(&server)
        .await;

    let guard = QuotaGuard::new(
        Arc::new(HttpQuotaStore::new(&server.uri(), reqwest::Client::new())),
        1.0,
    );
    assert!(guard.authorize("u1", ToolName::SearchWeb).await.is_allowed());
}

#[tokio::test]
async fn unavailable_snapshot_denies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/u1/usage"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let guard = QuotaGuard::new(
        Arc::new(HttpQuotaStore::new(&server.uri(), reqwest::Client::new())),
        1.0,
    );
    assert_eq!(
        guard.authorize("u1", ToolName::SearchWeb).await,
        QuotaDecision::Deny(ToolError::QuotaUnavailable("searchWeb".into()))
    );
}

#[tokio::test]
async fn usage_is_recorded_by_tool_name() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users/u1/usage"))
        .and(body_json(json!({"tool": "generateImage"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let guard = QuotaGuard::new(
        Arc::new(HttpQuotaStore::new(&server.uri(), reqwest::Client::new())),
        1.0,
    );
    guard
        .record("u1", ToolName::GenerateImage)
        .await
        .expect("recorded");
}

#[tokio::test]
async fn user_id_cannot_escape_its_path_segment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/victim/usage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"tool": "searchWeb", "used": 1, "limit": 10}
        ])))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/victim%2Fusage%23/usage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/victim%2Fusage%23/usage"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = HttpQuotaStore::new(&server.uri(), reqwest::Client::new());
    let snapshot = store.usage_snapshot("victim/usage#").await.expect("snapshot");
    assert!(snapshot.is_empty());
    store
        .record_usage("victim/usage#", "searchWeb")
        .await
        .expect("recorded");
}

#[tokio::test]
async fn stalled_identity_service_denies_within_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/u1/usage"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let guard = QuotaGuard::new(
        Arc::new(HttpQuotaStore::new(&server.uri(), reqwest::Client::new())),
        1.0,
    )
    .with_timeout(Duration::from_millis(200));
    let started = Instant::now();
    assert_eq!(
        guard.authorize("u1", ToolName::SearchWeb).await,
        QuotaDecision::Deny(ToolError::QuotaUnavailable("searchWeb".into()))
    );
    assert!(started.elapsed() < Duration::from_secs(3));
}
