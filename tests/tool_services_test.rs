//! Tool dispatch against mock tool microservices and asset store.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use toolstream::assets::{HttpAssetStore, PassthroughAssetStore};
use toolstream::config::{ToolServiceConfig, ToolTimeouts};
use toolstream::error::ToolError;
use toolstream::tools::{ToolContext, ToolName, ToolRegistry};
use toolstream::types::ToolInvocation;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn invocation(name: &str, arguments: serde_json::Value) -> ToolInvocation {
    ToolInvocation {
        id: "call_1".to_string(),
        name: name.to_string(),
        arguments,
    }
}

fn ctx() -> ToolContext {
    ToolContext::new("user-7", "session-9")
}

#[tokio::test]
async fn posts_arguments_with_caller_identity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/searchWeb"))
        .and(header("x-session-id", "session-9"))
        .and(body_json(json!({"query": "rust streams", "user_id": "user-7"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": ["a", "b"]})))
        .expect(1)
        .mount(&server)
        .await;

    let registry = ToolRegistry::from_config(
        &ToolServiceConfig::new(&server.uri()),
        reqwest::Client::new(),
        Arc::new(PassthroughAssetStore),
    );
    let result = registry
        .dispatch(&ctx(), &invocation("searchWeb", json!({"query": "rust streams"})))
        .await;
    assert_eq!(result.tool_call_id, "call_1");
    assert_eq!(result.outcome, Ok(json!({"results": ["a", "b"]})));
}

#[tokio::test]
async fn non_success_status_becomes_error_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/getCryptoPrice"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let registry = ToolRegistry::from_config(
        &ToolServiceConfig::new(&server.uri()),
        reqwest::Client::new(),
        Arc::new(PassthroughAssetStore),
    );
    let result = registry
        .dispatch(&ctx(), &invocation("getCryptoPrice", json!({"symbol": "BTC"})))
        .await;
    assert_eq!(
        result.outcome,
        Err(ToolError::Http {
            tool: "getCryptoPrice".into(),
            status: 500
        })
    );
    assert!(result.content().contains("\"error\":true"));
}

#[tokio::test]
async fn slow_service_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/getWeather"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"temp": 3}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config = ToolServiceConfig::new(&server.uri()).with_timeouts(ToolTimeouts::uniform(1));
    let registry =
        ToolRegistry::from_config(&config, reqwest::Client::new(), Arc::new(PassthroughAssetStore));
    let result = registry
        .dispatch(&ctx(), &invocation("getWeather", json!({"location": "Oslo"})))
        .await;
    assert_eq!(
        result.outcome,
        Err(ToolError::Timeout {
            tool: "getWeather".into(),
            seconds: 1
        })
    );
}

#[tokio::test]
async fn per_tool_endpoint_override() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/wiki"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"summary": "Rust"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = ToolServiceConfig::new("http://127.0.0.1:9")
        .with_endpoint(ToolName::SearchWikipedia, &format!("{}/v2/wiki", server.uri()));
    let registry =
        ToolRegistry::from_config(&config, reqwest::Client::new(), Arc::new(PassthroughAssetStore));
    let result = registry
        .dispatch(&ctx(), &invocation("searchWikipedia", json!({"query": "Rust"})))
        .await;
    assert!(!result.is_error());
}

#[tokio::test]
async fn generated_image_is_persisted_before_reporting() {
    let tools = MockServer::start().await;
    let assets = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generateImage"))
        .and(body_partial_json(json!({"prompt": "cat"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"url": "https://ephemeral.example/x.png", "seed": 4})),
        )
        .mount(&tools)
        .await;
    Mock::given(method("POST"))
        .and(path("/assets"))
        .and(body_json(json!({"url": "https://ephemeral.example/x.png"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"url": "https://cdn.example/y.png"})),
        )
        .expect(1)
        .mount(&assets)
        .await;

    let http = reqwest::Client::new();
    let registry = ToolRegistry::from_config(
        &ToolServiceConfig::new(&tools.uri()),
        http.clone(),
        Arc::new(HttpAssetStore::new(&assets.uri(), http)),
    );
    let result = registry
        .dispatch(&ctx(), &invocation("generateImage", json!({"prompt": "cat"})))
        .await;
    assert_eq!(
        result.outcome,
        Ok(json!({"url": "https://cdn.example/y.png", "seed": 4}))
    );
    assert_eq!(result.images, vec!["https://cdn.example/y.png".to_string()]);
}

#[tokio::test]
async fn asset_store_failure_is_a_tool_error() {
    let tools = MockServer::start().await;
    let assets = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generateImage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"url": "https://e/x.png"})))
        .mount(&tools)
        .await;
    Mock::given(method("POST"))
        .and(path("/assets"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&assets)
        .await;

    let http = reqwest::Client::new();
    let registry = ToolRegistry::from_config(
        &ToolServiceConfig::new(&tools.uri()),
        http.clone(),
        Arc::new(HttpAssetStore::new(&assets.uri(), http)),
    );
    let result = registry
        .dispatch(&ctx(), &invocation("generateImage", json!({"prompt": "cat"})))
        .await;
    assert!(matches!(result.outcome, Err(ToolError::AssetStore(_))));
    assert!(result.images.is_empty());
}
