//! Retry-then-succeed behavior against a transiently failing upstream.

mod common;

use common::{anthropic_body, base_config, serve};
use mock_server::{MockServer, Scripted};

#[tokio::test]
async fn retries_a_rate_limited_upstream_and_eventually_succeeds() {
    let mock = MockServer::new(vec![Scripted::rate_limited(0), Scripted::anthropic_ok("4")]);
    let mock_url = mock.spawn().await;
    let base = serve(base_config(&mock_url)).await;

    let client = reqwest::Client::new();
    let resp = client.post(format!("{base}/v1/messages")).json(&anthropic_body()).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(mock.call_count(), 2, "first attempt should fail, second should succeed");
}

#[tokio::test]
async fn exhausting_retries_surfaces_the_upstream_error() {
    let mock = MockServer::new(vec![Scripted::server_error()]);
    let mock_url = mock.spawn().await;
    let mut config = base_config(&mock_url);
    config.retry.max_attempts = 2;
    let base = serve(config).await;

    let client = reqwest::Client::new();
    let resp = client.post(format!("{base}/v1/messages")).json(&anthropic_body()).send().await.unwrap();
    assert_eq!(resp.status(), 500);
    assert_eq!(mock.call_count(), 2, "should have exhausted both attempts");
}
