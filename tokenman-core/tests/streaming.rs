//! Streaming requests bypass the response cache and forward upstream
//! bytes through to the client untouched.

mod common;

use common::{anthropic_body, base_config, serve};
use mock_server::{MockServer, Scripted};
use serde_json::json;

#[tokio::test]
async fn streaming_requests_bypass_the_cache() {
    let mock = MockServer::new(vec![Scripted::anthropic_ok("4"), Scripted::anthropic_ok("4")]);
    let mock_url = mock.spawn().await;
    let base = serve(base_config(&mock_url)).await;

    let client = reqwest::Client::new();
    let mut streaming_body = anthropic_body();
    streaming_body["stream"] = json!(true);

    for _ in 0..2 {
        let resp = client.post(format!("{base}/v1/messages")).json(&streaming_body).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers().get("x-tokenman-cache").unwrap(), "MISS");
    }
    assert_eq!(mock.call_count(), 2, "each streaming request must dispatch upstream");
}

#[tokio::test]
async fn streamed_content_is_forwarded_to_the_client() {
    let events = vec![
        json!({"type": "content_block_delta", "delta": {"text": "hel"}}).to_string(),
        json!({"type": "content_block_delta", "delta": {"text": "lo"}}).to_string(),
    ];
    let mock = MockServer::new(vec![Scripted::stream(events)]);
    let mock_url = mock.spawn().await;
    let base = serve(base_config(&mock_url)).await;

    let mut streaming_body = anthropic_body();
    streaming_body["stream"] = json!(true);

    let client = reqwest::Client::new();
    let resp = client.post(format!("{base}/v1/messages")).json(&streaming_body).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let text = resp.text().await.unwrap();
    assert!(text.contains("hel"));
    assert!(text.contains("lo"));
}
