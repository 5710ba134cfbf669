//! Shared fixtures for the integration suite: a default `Config`
//! pointed at a mock upstream, a running `tokenman` instance on an
//! ephemeral port, and the Anthropic request body the tests build on.

use std::{collections::HashMap, time::Duration};

use serde_json::json;
use tokenman_core::{
    app_state::AppState,
    config::{Config, ProviderConfig, router::ModelRoute},
    handler,
    types::{InferenceProvider, Secret},
};

pub const MODEL: &str = "claude-sonnet-4";

#[allow(dead_code)]
pub fn base_config(mock_base_url: &str) -> Config {
    let mut config = Config::default();
    config.cache.store_path = ":memory:".to_string();
    config.rate_limit.enabled = false;
    config.providers = vec![ProviderConfig {
        provider: InferenceProvider::Anthropic,
        enabled: true,
        api_key: Secret::new("test-key".to_string()),
        base_url: Some(mock_base_url.to_string()),
    }];
    let mut models = HashMap::new();
    models.insert(
        MODEL.to_string(),
        ModelRoute {
            providers: vec![InferenceProvider::Anthropic],
        },
    );
    config.router.models = models;
    config.retry.max_attempts = 3;
    config.retry.base_delay = Duration::from_millis(5);
    config.retry.max_delay = Duration::from_millis(50);
    config
}

#[allow(dead_code)]
pub async fn serve(config: Config) -> String {
    let state = AppState::new(config, None).await.expect("app state construction failed");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = handler::router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[allow(dead_code)]
pub fn anthropic_body() -> serde_json::Value {
    json!({
        "model": MODEL,
        "max_tokens": 100,
        "messages": [{"role": "user", "content": "what is 2+2?"}],
    })
}
