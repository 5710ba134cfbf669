//! Per-period budget enforcement rejects requests once the configured
//! spend limit would be exceeded, before the upstream is ever called.

mod common;

use common::{anthropic_body, base_config, serve};
use mock_server::{MockServer, Scripted};

#[tokio::test]
async fn budget_exceeded_returns_429_with_retry_after() {
    let mock = MockServer::new(vec![Scripted::anthropic_ok("4")]);
    let mock_url = mock.spawn().await;
    let mut config = base_config(&mock_url);
    config.budget.hourly_limit_usd = Some(0.0000001);
    config.budget.daily_limit_usd = None;
    config.budget.monthly_limit_usd = None;
    let base = serve(config).await;

    let client = reqwest::Client::new();
    let resp = client.post(format!("{base}/v1/messages")).json(&anthropic_body()).send().await.unwrap();
    assert_eq!(resp.status(), 429);
    assert!(resp.headers().contains_key("retry-after"));
    assert_eq!(mock.call_count(), 0, "a budget rejection must not reach the upstream");
}

#[tokio::test]
async fn requests_within_budget_are_allowed_through() {
    let mock = MockServer::new(vec![Scripted::anthropic_ok("4")]);
    let mock_url = mock.spawn().await;
    let mut config = base_config(&mock_url);
    config.budget.hourly_limit_usd = Some(1000.0);
    let base = serve(config).await;

    let client = reqwest::Client::new();
    let resp = client.post(format!("{base}/v1/messages")).json(&anthropic_body()).send().await.unwrap();
    assert_eq!(resp.status(), 200);
}
