//! A minimal stand-in upstream for Anthropic's `/v1/messages` and
//! OpenAI's `/v1/chat/completions`, used by `tokenman-core`'s
//! integration tests to exercise retry, circuit-breaker, and streaming
//! behavior against a real HTTP server rather than a mocked transport.
//!
//! A [`MockServer`] replays a fixed script of [`Scripted`] responses in
//! order, repeating the last entry once the script is exhausted — the
//! shape retry and circuit-breaker tests need ("fail twice, then
//! succeed").

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
};
use http::{HeaderValue, StatusCode, header};
use serde_json::{Value, json};

/// One canned reply: the status/body/headers to hand back, an optional
/// delay before replying, and (for streaming tests) a sequence of SSE
/// event payloads to emit as a chunked body instead of a single buffer.
#[derive(Debug, Clone)]
pub struct Scripted {
    pub status: u16,
    pub body: Value,
    pub retry_after_secs: Option<u64>,
    pub delay: Duration,
    pub sse_events: Option<Vec<String>>,
}

impl Scripted {
    pub fn anthropic_ok(text: &str) -> Self {
        Self::ok(json!({
            "id": "msg_mock",
            "type": "message",
            "role": "assistant",
            "model": "claude-mock",
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 20},
        }))
    }

    pub fn openai_ok(text: &str) -> Self {
        Self::ok(json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "model": "gpt-mock",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": text}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30},
        }))
    }

    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body,
            retry_after_secs: None,
            delay: Duration::ZERO,
            sse_events: None,
        }
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self {
            status: 429,
            body: json!({"error": {"type": "rate_limit_error", "message": "rate limited"}}),
            retry_after_secs: Some(retry_after_secs),
            delay: Duration::ZERO,
            sse_events: None,
        }
    }

    pub fn server_error() -> Self {
        Self {
            status: 500,
            body: json!({"error": {"type": "internal_error", "message": "upstream failed"}}),
            retry_after_secs: None,
            delay: Duration::ZERO,
            sse_events: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Wraps `events` (already-formatted `data: ...` SSE payloads) into
    /// a streaming response; `body`/`status` are ignored when set.
    pub fn stream(events: Vec<String>) -> Self {
        Self {
            status: 200,
            body: Value::Null,
            retry_after_secs: None,
            delay: Duration::ZERO,
            sse_events: Some(events),
        }
    }
}

struct MockState {
    script: Vec<Scripted>,
    cursor: usize,
    calls: usize,
    last_body: Option<Value>,
}

#[derive(Clone)]
pub struct MockServer {
    state: Arc<Mutex<MockState>>,
}

impl MockServer {
    pub fn new(script: Vec<Scripted>) -> Self {
        assert!(!script.is_empty(), "mock server needs at least one scripted response");
        Self {
            state: Arc::new(Mutex::new(MockState {
                script,
                cursor: 0,
                calls: 0,
                last_body: None,
            })),
        }
    }

    /// Number of requests served so far, for asserting retry counts.
    pub fn call_count(&self) -> usize {
        self.state.lock().expect("mock server state lock poisoned").calls
    }

    /// The JSON body of the most recent request this server received, for
    /// asserting what a middleware actually sent upstream (e.g. that PII
    /// was redacted or the message history was trimmed).
    pub fn last_request_body(&self) -> Option<Value> {
        self.state.lock().expect("mock server state lock poisoned").last_body.clone()
    }

    pub fn into_router(self) -> Router {
        Router::new()
            .route("/v1/messages", post(handle))
            .route("/v1/chat/completions", post(handle))
            .with_state(self)
    }

    /// Binds an ephemeral local port and serves in the background.
    /// Returns the base URL the dispatcher's provider config should
    /// point at.
    pub async fn spawn(self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("mock server failed to bind ephemeral port");
        let addr = listener.local_addr().expect("bound listener has a local address");
        let app = self.into_router();
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock server crashed");
        });
        format!("http://{addr}")
    }

    fn next(&self, body: Value) -> Scripted {
        let mut state = self.state.lock().expect("mock server state lock poisoned");
        let index = state.cursor.min(state.script.len() - 1);
        let reply = state.script[index].clone();
        if state.cursor + 1 < state.script.len() {
            state.cursor += 1;
        }
        state.calls += 1;
        state.last_body = Some(body);
        reply
    }
}

async fn handle(State(server): State<MockServer>, Json(body): Json<Value>) -> Response {
    let scripted = server.next(body);
    if !scripted.delay.is_zero() {
        tokio::time::sleep(scripted.delay).await;
    }

    if let Some(events) = scripted.sse_events {
        let body_text = events
            .into_iter()
            .map(|event| format!("data: {event}\n\n"))
            .collect::<String>();
        let mut response = Response::new(Body::from(body_text));
        *response.status_mut() = StatusCode::OK;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        return response;
    }

    let status = StatusCode::from_u16(scripted.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, Json(scripted.body)).into_response();
    if let Some(secs) = scripted.retry_after_secs {
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_script_in_order_then_repeats_last() {
        let server = MockServer::new(vec![Scripted::rate_limited(1), Scripted::anthropic_ok("hi")]);
        assert_eq!(server.next(json!({})).status, 429);
        assert_eq!(server.next(json!({})).status, 200);
        assert_eq!(server.next(json!({})).status, 200);
        assert_eq!(server.call_count(), 3);
    }
}
