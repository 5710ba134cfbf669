//! Boolean content-shrinking toggles, applied to `text` content parts
//! only — tool-call arguments and other structured payloads are never
//! touched, so a toggle can never corrupt a schema a provider expects to
//! parse.

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

use crate::{
    config::compression::RuleToggles,
    error::ApiError,
    pipeline::{Middleware, Outcome, RequestContext},
    types::{Content, Request},
};

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static BLANK_LINES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static MARKDOWN_EMPHASIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\*\*|__|\*|_|`)").unwrap());
static MARKDOWN_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s*").unwrap());

fn collapse_whitespace(text: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(text, " ");
    BLANK_LINES_RE.replace_all(&collapsed, "\n\n").to_string()
}

fn minify_json(text: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => serde_json::to_string(&value).unwrap_or_else(|_| text.to_string()),
        Err(_) => text.to_string(),
    }
}

fn minify_xml(text: &str) -> String {
    let trimmed: String = text
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("");
    if trimmed.starts_with('<') {
        trimmed
    } else {
        text.to_string()
    }
}

fn strip_markdown(text: &str) -> String {
    let no_headings = MARKDOWN_HEADING_RE.replace_all(text, "");
    MARKDOWN_EMPHASIS_RE.replace_all(&no_headings, "").to_string()
}

fn dedup_instructions(text: &str) -> String {
    let mut seen = std::collections::HashSet::new();
    text.lines()
        .filter(|line| seen.insert(line.trim().to_string()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct RulesMiddleware {
    toggles: RuleToggles,
}

impl RulesMiddleware {
    pub fn new(toggles: RuleToggles) -> Self {
        Self { toggles }
    }

    fn apply(&self, text: &str) -> (String, usize) {
        let mut out = text.to_string();
        if self.toggles.collapse_whitespace {
            out = collapse_whitespace(&out);
        }
        if self.toggles.minify_json {
            out = minify_json(&out);
        }
        if self.toggles.minify_xml {
            out = minify_xml(&out);
        }
        if self.toggles.dedup_instructions {
            out = dedup_instructions(&out);
        }
        if self.toggles.strip_markdown {
            out = strip_markdown(&out);
        }
        let saved = text.len().saturating_sub(out.len());
        (out, saved)
    }
}

#[async_trait]
impl Middleware for RulesMiddleware {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn process_request(
        &self,
        _ctx: &RequestContext,
        mut req: Request,
    ) -> Result<Outcome, ApiError> {
        let mut bytes_saved: u64 = 0;
        for message in req.messages.iter_mut() {
            match &mut message.content {
                Content::Text(text) => {
                    let (rewritten, saved) = self.apply(text);
                    bytes_saved += saved as u64;
                    *text = rewritten;
                }
                Content::Parts(parts) => {
                    for part in parts.iter_mut() {
                        if part.kind != "text" {
                            continue;
                        }
                        if let Some(text) = &part.text {
                            let (rewritten, saved) = self.apply(text);
                            bytes_saved += saved as u64;
                            part.text = Some(rewritten);
                        }
                    }
                }
            }
        }
        req.metadata.insert(
            "rules_bytes_saved".to_string(),
            serde_json::Value::Number(bytes_saved.into()),
        );
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
    use crate::types::{Message, Role, WireFormat};

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
    async fn collapses_whitespace() {
        let mw = RulesMiddleware::new(RuleToggles {
            collapse_whitespace: true,
            minify_json: false,
            minify_xml: false,
            dedup_instructions: false,
            strip_markdown: false,
        });
        let Outcome::Continue(req) = mw
            .process_request(&ctx(), request_with("hello     world"))
            .await
            .unwrap()
        else {
            unreachable!()
        };
        assert_eq!(req.messages[0].content.as_text(), "hello world");
    }

    #[tokio::test]
    async fn dedups_repeated_lines() {
        let mw = RulesMiddleware::new(RuleToggles {
            collapse_whitespace: false,
            minify_json: false,
            minify_xml: false,
            dedup_instructions: true,
            strip_markdown: false,
        });
        let Outcome::Continue(req) = mw
            .process_request(&ctx(), request_with("be concise\nbe concise\nbe helpful"))
            .await
            .unwrap()
        else {
            unreachable!()
        };
        assert_eq!(req.messages[0].content.as_text(), "be concise\nbe helpful");
    }
}
