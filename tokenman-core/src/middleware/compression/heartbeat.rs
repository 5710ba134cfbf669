//! Detects near-identical polling/status requests repeated in quick
//! succession — the "are we there yet" pattern some agent frameworks
//! poll with — and redirects them to a cheaper configured model instead
//! of paying full price on every tick.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::{
    config::compression::HeartbeatConfig,
    error::ApiError,
    pipeline::{Middleware, Outcome, RequestContext},
    types::Request,
};

fn last_user_fingerprint(req: &Request) -> Option<String> {
    let text = req
        .messages
        .iter()
        .rev()
        .find(|m| m.role == crate::types::Role::User)
        .map(|m| m.content.as_text())?;
    let normalized: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = Sha256::new();
    hasher.update(req.model.as_bytes());
    hasher.update(b"\0");
    hasher.update(normalized.as_bytes());
    Some(hasher.finalize().iter().map(|b| format!("{b:02x}")).collect())
}

pub struct HeartbeatMiddleware {
    config: HeartbeatConfig,
    seen: moka::sync::Cache<String, ()>,
}

impl HeartbeatMiddleware {
    pub fn new(config: HeartbeatConfig) -> Self {
        let seen = moka::sync::Cache::builder()
            .time_to_live(std::time::Duration::from_secs(config.dedup_window_secs.max(1)))
            .max_capacity(10_000)
            .build();
        Self { config, seen }
    }
}

#[async_trait]
impl Middleware for HeartbeatMiddleware {
    fn name(&self) -> &'static str {
        "heartbeat"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn process_request(
        &self,
        _ctx: &RequestContext,
        mut req: Request,
    ) -> Result<Outcome, ApiError> {
        let Some(fingerprint) = last_user_fingerprint(&req) else {
            return Ok(Outcome::Continue(req));
        };

        let is_repeat = self.seen.get(&fingerprint).is_some();
        self.seen.insert(fingerprint, ());

        if is_repeat {
            req.set_flag("heartbeat_detected", true);
            if let Some(model) = &self.config.heartbeat_model {
                req.model = model.clone();
            }
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

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::types::{Content, Message, Role, WireFormat};

    fn ctx() -> RequestContext {
        RequestContext {
            request_id: uuid::Uuid::new_v4(),
            cancellation: CancellationToken::new(),
        }
    }

    fn request_with(text: &str) -> Request {
        Request {
            id: uuid::Uuid::new_v4(),
            wire_format: WireFormat::Anthropic,
            model: "claude-sonnet-4".to_string(),
            messages: vec![Message {
                role: Role::User,
                content: Content::Text(text.to_string()),
                extras: serde_json::Map::new(),
            }],
            tools: Vec::new(),
            stream: false,
            temperature: None,
            tokens_in: 1,
            flags: Default::default(),
            metadata: Default::default(),
            extras: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn redirects_repeated_poll_to_heartbeat_model() {
        let mw = HeartbeatMiddleware::new(HeartbeatConfig {
            enabled: true,
            dedup_window_secs: 30,
            heartbeat_model: Some("claude-haiku".to_string()),
        });

        let Outcome::Continue(first) = mw
            .process_request(&ctx(), request_with("any updates?"))
            .await
            .unwrap()
        else {
            unreachable!()
        };
        assert_eq!(first.model, "claude-sonnet-4");

        let Outcome::Continue(second) = mw
            .process_request(&ctx(), request_with("any updates?"))
            .await
            .unwrap()
        else {
            unreachable!()
        };
        assert_eq!(second.model, "claude-haiku");
        assert!(second.flag("heartbeat_detected"));
    }

    #[tokio::test]
    async fn distinct_prompts_never_redirect() {
        let mw = HeartbeatMiddleware::new(HeartbeatConfig {
            enabled: true,
            dedup_window_secs: 30,
            heartbeat_model: Some("claude-haiku".to_string()),
        });
        mw.process_request(&ctx(), request_with("first question"))
            .await
            .unwrap();
        let Outcome::Continue(second) = mw
            .process_request(&ctx(), request_with("second question"))
            .await
            .unwrap()
        else {
            unreachable!()
        };
        assert_eq!(second.model, "claude-sonnet-4");
    }
}
