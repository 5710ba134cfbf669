//! Pipeline-wide behavior not specific to any one middleware: routing
//! failures, the history-window trim, and the ancillary endpoints.

mod common;

use common::{anthropic_body, base_config, serve, MODEL};
use mock_server::{MockServer, Scripted};
use serde_json::json;

#[tokio::test]
async fn unknown_model_returns_404() {
    let mock = MockServer::new(vec![Scripted::anthropic_ok("4")]);
    let mock_url = mock.spawn().await;
    let base = serve(base_config(&mock_url)).await;

    let mut body = anthropic_body();
    body["model"] = json!("no-such-model");

    let client = reqwest::Client::new();
    let resp = client.post(format!("{base}/v1/messages")).json(&body).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn health_and_readiness_and_models_endpoints() {
    let mock = MockServer::new(vec![Scripted::anthropic_ok("4")]);
    let mock_url = mock.spawn().await;
    let base = serve(base_config(&mock_url)).await;

    let client = reqwest::Client::new();
    let health = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(health.status(), 200);

    let ready = client.get(format!("{base}/health/ready")).send().await.unwrap();
    assert_eq!(ready.status(), 200);

    let models = client.get(format!("{base}/v1/models")).send().await.unwrap();
    assert_eq!(models.status(), 200);
    let body: serde_json::Value = models.json().await.unwrap();
    assert_eq!(body["data"], json!([MODEL]));
}

#[tokio::test]
async fn long_conversations_are_trimmed_before_reaching_the_upstream() {
    let mock = MockServer::new(vec![Scripted::anthropic_ok("ok")]);
    let mock_url = mock.spawn().await;
    let mut config = base_config(&mock_url);
    config.compression.history_window_size = 3;
    let base = serve(config).await;

    let messages: Vec<_> = (0..10)
        .map(|i| json!({"role": if i % 2 == 0 { "user" } else { "assistant" }, "content": format!("turn {i}")}))
        .collect();
    let body = json!({
        "model": MODEL,
        "max_tokens": 100,
        "messages": messages,
    });

    let client = reqwest::Client::new();
    let resp = client.post(format!("{base}/v1/messages")).json(&body).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let forwarded = mock.last_request_body().expect("mock should have received a request");
    let forwarded_messages = forwarded["messages"].as_array().unwrap();
    assert_eq!(forwarded_messages.len(), 3, "only the most recent 3 turns should survive the window");
    assert_eq!(forwarded_messages.last().unwrap()["content"], json!("turn 9"));
}
