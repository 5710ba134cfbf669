//! Per-provider token-bucket rate limiting rejects bursts above the
//! configured quota with a `Retry-After`.

mod common;

use common::{anthropic_body, base_config, serve};
use mock_server::{MockServer, Scripted};
use tokenman_core::types::InferenceProvider;

#[tokio::test]
async fn a_burst_above_the_configured_quota_is_rate_limited() {
    let mock = MockServer::new(vec![Scripted::anthropic_ok("4")]);
    let mock_url = mock.spawn().await;
    let mut config = base_config(&mock_url);
    config.rate_limit.enabled = true;
    config.rate_limit.providers.insert(
        InferenceProvider::Anthropic,
        tokenman_core::config::rate_limit::GcraConfig {
            rate_per_sec: 1,
            burst: 1,
        },
    );
    let base = serve(config).await;

    let client = reqwest::Client::new();
    let first = client.post(format!("{base}/v1/messages")).json(&anthropic_body()).send().await.unwrap();
    assert_eq!(first.status(), 200);

    let second = client.post(format!("{base}/v1/messages")).json(&anthropic_body()).send().await.unwrap();
    assert_eq!(second.status(), 429);
    assert!(second.headers().contains_key("retry-after"));
}
