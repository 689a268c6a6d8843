//! `toolstream` server binary.
//!
//! Configuration comes from `TOOLSTREAM_CONFIG` (a JSON file) when set,
//! otherwise from `TOOLSTREAM_*` environment variables.

use std::sync::Arc;

use tokio::net::TcpListener;
use toolstream::assets::{AssetStore, HttpAssetStore, PassthroughAssetStore};
use toolstream::config::RelayConfig;
use toolstream::orchestrator::{Orchestrator, OrchestratorOptions};
use toolstream::quota::{HttpQuotaStore, InMemoryQuotaStore, QuotaGuard, QuotaStore};
use toolstream::server_adapters::axum::{AppState, router};
use toolstream::telemetry;
use toolstream::tools::ToolRegistry;
use toolstream::upstream::OpenAiCompletionClient;
use toolstream::{RelayError, Result};

fn load_config() -> Result<RelayConfig> {
    let config = match std::env::var("TOOLSTREAM_CONFIG") {
        Ok(path) => RelayConfig::from_file(path)?,
        Err(_) => RelayConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn build_state(config: &RelayConfig) -> Result<AppState> {
    let http_client = reqwest::Client::builder()
        .connect_timeout(config.upstream.connect_timeout())
        .build()
        .map_err(|e| RelayError::ConfigurationError(format!("Failed to build HTTP client: {e}")))?;

    let assets: Arc<dyn AssetStore> = match &config.assets.base_url {
        Some(url) => Arc::new(HttpAssetStore::new(url, http_client.clone())),
        None => {
            tracing::warn!("no asset store configured; generated media keeps upstream URLs");
            Arc::new(PassthroughAssetStore)
        }
    };
    let quota_store: Arc<dyn QuotaStore> = match &config.quota.identity_base_url {
        Some(url) => Arc::new(HttpQuotaStore::new(url, http_client.clone())),
        None => {
            tracing::warn!(
                default_limit = config.quota.default_limit,
                "no identity service configured; using in-memory quota"
            );
            Arc::new(InMemoryQuotaStore::new(config.quota.default_limit))
        }
    };

    let tools = ToolRegistry::from_config(&config.tools, http_client.clone(), assets);
    let client = OpenAiCompletionClient::with_http_client(&config.upstream, http_client);
    let orchestrator = Orchestrator::new(
        Arc::new(client),
        Arc::new(tools),
        QuotaGuard::new(quota_store, config.quota.window_scaling_factor)
            .with_timeout(config.quota.timeout()),
        OrchestratorOptions::from_config(config),
    );
    Ok(AppState::new(Arc::new(orchestrator)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let _guard = telemetry::init_from_env()?;
    let config = load_config()?;
    let state = build_state(&config)?;

    let listener = TcpListener::bind(&config.server.bind_addr).await?;
    tracing::info!(
        addr = %config.server.bind_addr,
        model = %config.upstream.model,
        "toolstream listening"
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
