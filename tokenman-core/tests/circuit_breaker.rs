//! Breaker trips after repeated upstream failures and short-circuits
//! further requests without dispatching to the upstream at all.

mod common;

use common::{anthropic_body, base_config, serve};
use mock_server::{MockServer, Scripted};

#[tokio::test]
async fn circuit_opens_after_repeated_failures_and_short_circuits_without_calling_upstream() {
    let mock = MockServer::new(vec![Scripted::server_error()]);
    let mock_url = mock.spawn().await;
    let mut config = base_config(&mock_url);
    config.circuit_breaker.failure_threshold = 2;
    config.retry.max_attempts = 1;
    let base = serve(config).await;

    let client = reqwest::Client::new();
    for _ in 0..2 {
        let resp = client.post(format!("{base}/v1/messages")).json(&anthropic_body()).send().await.unwrap();
        assert_eq!(resp.status(), 500);
    }

    let calls_before = mock.call_count();
    let resp = client.post(format!("{base}/v1/messages")).json(&anthropic_body()).send().await.unwrap();
    assert_eq!(resp.status(), 503);
    assert_eq!(mock.call_count(), calls_before, "breaker should reject before dispatching upstream");
}
