//! Fingerprints system prompts and tool definitions by SHA-256 of
//! normalized text. Once a fingerprint's hit count crosses the
//! configured threshold, the content block is annotated so the provider
//! can serve it from its own prompt cache.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::{
    error::ApiError,
    pipeline::{Middleware, Outcome, RequestContext},
    store::FingerprintStore,
    types::{Content, ContentPart, Request, Role, WireFormat},
};

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fingerprint_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(text).as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

pub struct ContentDedupMiddleware {
    enabled: bool,
    threshold: u32,
    store: Arc<dyn FingerprintStore>,
}

impl ContentDedupMiddleware {
    pub fn new(enabled: bool, threshold: u32, store: Arc<dyn FingerprintStore>) -> Self {
        Self {
            enabled,
            threshold,
            store,
        }
    }

    async fn annotate_text(&self, wire_format: WireFormat, text: &str) -> Option<serde_json::Value> {
        let hash = fingerprint_hash(text);
        let now = chrono::Utc::now();
        let record = match self
            .store
            .upsert(&hash, "text/plain", (text.len() / 4) as u32, now)
            .await
        {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(error = %err, "fingerprint upsert failed");
                return None;
            }
        };

        if record.hit_count < self.threshold {
            return None;
        }

        match wire_format {
            WireFormat::Anthropic => Some(json!({"type": "ephemeral"})),
            WireFormat::OpenAi => None,
        }
    }
}

#[async_trait]
impl Middleware for ContentDedupMiddleware {
    fn name(&self) -> &'static str {
        "content_dedup"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn process_request(
        &self,
        _ctx: &RequestContext,
        mut req: Request,
    ) -> Result<Outcome, ApiError> {
        let wire_format = req.wire_format;
        let mut stable_indices = Vec::new();

        for (idx, message) in req.messages.iter_mut().enumerate() {
            if message.role != Role::System {
                continue;
            }
            match &mut message.content {
                Content::Text(text) => {
                    if let Some(cache_control) = self.annotate_text(wire_format, text).await {
                        message
                            .extras
                            .insert("cache_control".to_string(), cache_control);
                    }
                    stable_indices.push(idx);
                }
                Content::Parts(parts) => {
                    for part in parts.iter_mut() {
                        let Some(text) = part.text.clone() else { continue };
                        if let Some(cache_control) = self.annotate_text(wire_format, &text).await {
                            part.cache_control = Some(cache_control);
                        }
                    }
                    stable_indices.push(idx);
                }
            }
        }

        for tool in &req.tools {
            let text = format!("{}:{}", tool.name, tool.description.as_deref().unwrap_or(""));
            let _ = self.annotate_text(wire_format, &text).await;
        }

        if wire_format == WireFormat::OpenAi && !stable_indices.is_empty() {
            reorder_stable_first(&mut req.messages, &stable_indices);
        }

        Ok(Outcome::Continue(req))
    }

    async fn process_response(
        &self,
        _ctx: &RequestContext,
        _req: &Request,
        resp: crate::types::Response,
    ) -> Result<crate::types::Response, ApiError> {
        Ok(resp)
    }
}

/// OpenAI has no native `cache_control` annotation; the best available
/// lever is moving stable (system) content to the front of the message
/// list so its prefix-matching cache can key off of it.
fn reorder_stable_first(messages: &mut Vec<crate::types::Message>, stable: &[usize]) {
    let mut stable_msgs = Vec::new();
    let mut rest = Vec::new();
    for (idx, msg) in std::mem::take(messages).into_iter().enumerate() {
        if stable.contains(&idx) {
            stable_msgs.push(msg);
        } else {
            rest.push(msg);
        }
    }
    stable_msgs.extend(rest);
    *messages = stable_msgs;
}
