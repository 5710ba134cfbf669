//! Trims long conversations to a bounded window before they reach the
//! upstream provider: every leading system message is kept in full, and
//! the remainder of the budget is filled with the most recent
//! non-system turns, preserving their relative order.

use async_trait::async_trait;

use crate::{
    error::ApiError,
    pipeline::{Middleware, Outcome, RequestContext},
    types::{Message, Request, Role},
};

pub struct HistoryWindowMiddleware {
    enabled: bool,
    window_size: usize,
}

impl HistoryWindowMiddleware {
    pub fn new(enabled: bool, window_size: usize) -> Self {
        Self {
            enabled,
            window_size,
        }
    }

    fn truncate(&self, messages: Vec<Message>) -> Vec<Message> {
        if messages.len() <= self.window_size {
            return messages;
        }

        let system_count = messages
            .iter()
            .take_while(|m| m.role == Role::System)
            .count();
        let system = &messages[..system_count];
        let rest = &messages[system_count..];

        let budget = self.window_size.saturating_sub(system_count);
        let kept_rest = if rest.len() > budget {
            &rest[rest.len() - budget..]
        } else {
            rest
        };

        system.iter().chain(kept_rest).cloned().collect()
    }
}

#[async_trait]
impl Middleware for HistoryWindowMiddleware {
    fn name(&self) -> &'static str {
        "history_window"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn process_request(
        &self,
        _ctx: &RequestContext,
        mut req: Request,
    ) -> Result<Outcome, ApiError> {
        let before = req.messages.len();
        req.messages = self.truncate(std::mem::take(&mut req.messages));
        let dropped = before - req.messages.len();
        if dropped > 0 {
            req.metadata.insert(
                "history_window_dropped".to_string(),
                serde_json::Value::Number(dropped.into()),
            );
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
    use crate::types::{Content, WireFormat};

    fn ctx() -> RequestContext {
        RequestContext {
            request_id: uuid::Uuid::new_v4(),
            cancellation: CancellationToken::new(),
        }
    }

    fn msg(role: Role, text: &str) -> Message {
        Message {
            role,
            content: Content::Text(text.to_string()),
            extras: serde_json::Map::new(),
        }
    }

    fn request_with(messages: Vec<Message>) -> Request {
        Request {
            id: uuid::Uuid::new_v4(),
            wire_format: WireFormat::Anthropic,
            model: "claude-sonnet-4".to_string(),
            messages,
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
    async fn keeps_system_and_tail() {
        let mw = HistoryWindowMiddleware::new(true, 3);
        let messages = vec![
            msg(Role::System, "sys"),
            msg(Role::User, "1"),
            msg(Role::Assistant, "2"),
            msg(Role::User, "3"),
            msg(Role::Assistant, "4"),
        ];
        let Outcome::Continue(req) = mw
            .process_request(&ctx(), request_with(messages))
            .await
            .unwrap()
        else {
            unreachable!()
        };
        assert_eq!(req.messages.len(), 3);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[1].content.as_text(), "3");
        assert_eq!(req.messages[2].content.as_text(), "4");
    }

    #[tokio::test]
    async fn leaves_short_history_untouched() {
        let mw = HistoryWindowMiddleware::new(true, 20);
        let messages = vec![msg(Role::System, "sys"), msg(Role::User, "hi")];
        let Outcome::Continue(req) = mw
            .process_request(&ctx(), request_with(messages))
            .await
            .unwrap()
        else {
            unreachable!()
        };
        assert_eq!(req.messages.len(), 2);
    }
}
