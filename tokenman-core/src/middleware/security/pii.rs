//! Regex-taxonomy PII detection with per-kind actions. Credit-card
//! candidates additionally pass a Luhn checksum to cut false positives
//! on arbitrary 13-19 digit runs (phone numbers, order ids, and the
//! like).

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::{
    config::{security::PiiAction, PiiConfig},
    error::ApiError,
    pipeline::{Middleware, Outcome, RequestContext},
    store::{PiiLogRecord, PiiLogStore},
    types::{Content, Request},
};

struct PiiPattern {
    kind: &'static str,
    regex: &'static LazyLock<Regex>,
    verify: Option<fn(&str) -> bool>,
}

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b").unwrap()
});
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d{1,3}?[-.\s]?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b").unwrap());
static SSN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());
static CREDIT_CARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d[ -]?){13,19}\b").unwrap());
static API_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(sk|pk|api|token)[-_][A-Za-z0-9]{16,}\b").unwrap());

fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 13 {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

static PATTERNS: LazyLock<Vec<PiiPattern>> = LazyLock::new(|| {
    vec![
        PiiPattern { kind: "email", regex: &EMAIL_RE, verify: None },
        PiiPattern { kind: "phone", regex: &PHONE_RE, verify: None },
        PiiPattern { kind: "ssn", regex: &SSN_RE, verify: None },
        PiiPattern {
            kind: "credit_card",
            regex: &CREDIT_CARD_RE,
            verify: Some(luhn_valid),
        },
        PiiPattern { kind: "api_key", regex: &API_KEY_RE, verify: None },
    ]
});

pub struct PiiMiddleware {
    config: PiiConfig,
    store: Arc<dyn PiiLogStore>,
}

impl PiiMiddleware {
    pub fn new(config: PiiConfig, store: Arc<dyn PiiLogStore>) -> Self {
        Self { config, store }
    }

    fn placeholder(kind: &str) -> String {
        format!("[REDACTED_{}]", kind.to_uppercase())
    }

    fn hash_match(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        digest.iter().take(4).map(|b| format!("{b:02x}")).collect()
    }

    /// Applies the configured action to every detected occurrence in
    /// `text`, returning the (possibly rewritten) text and the list of
    /// detections made for logging.
    fn scan_and_apply(&self, field_path: &str, text: &str) -> (String, Vec<Detection>, bool) {
        let mut out = text.to_string();
        let mut detections = Vec::new();
        let mut blocked = false;

        for pattern in PATTERNS.iter() {
            let matches: Vec<(usize, usize, String)> = pattern
                .regex
                .find_iter(&out)
                .filter(|m| pattern.verify.map(|v| v(m.as_str())).unwrap_or(true))
                .map(|m| (m.start(), m.end(), m.as_str().to_string()))
                .collect();
            if matches.is_empty() {
                continue;
            }

            let action = self.config.action_for(pattern.kind);
            if action == PiiAction::Block {
                blocked = true;
            }

            let mut rebuilt = String::new();
            let mut cursor = 0;
            for (start, end, raw) in &matches {
                rebuilt.push_str(&out[cursor..*start]);
                let replacement = match action {
                    PiiAction::Redact => Self::placeholder(pattern.kind),
                    PiiAction::Hash => format!("[HASHED_{}_{}]", pattern.kind.to_uppercase(), Self::hash_match(raw)),
                    PiiAction::Log | PiiAction::Block => raw.clone(),
                };
                rebuilt.push_str(&replacement);
                cursor = *end;
                detections.push(Detection {
                    kind: pattern.kind,
                    action,
                    field_path: field_path.to_string(),
                    snippet: raw.chars().take(24).collect(),
                });
            }
            rebuilt.push_str(&out[cursor..]);
            out = rebuilt;
        }

        (out, detections, blocked)
    }
}

struct Detection {
    kind: &'static str,
    action: PiiAction,
    field_path: String,
    snippet: String,
}

#[async_trait]
impl Middleware for PiiMiddleware {
    fn name(&self) -> &'static str {
        "pii"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn process_request(
        &self,
        _ctx: &RequestContext,
        mut req: Request,
    ) -> Result<Outcome, ApiError> {
        let mut all_detections = Vec::new();
        let mut blocked = false;

        for (idx, message) in req.messages.iter_mut().enumerate() {
            let field_path = format!("messages[{idx}].content");
            match &mut message.content {
                Content::Text(text) => {
                    let (rewritten, detections, did_block) =
                        self.scan_and_apply(&field_path, text);
                    if did_block {
                        blocked = true;
                    }
                    if !detections.is_empty() {
                        message.content = Content::Text(rewritten);
                    }
                    all_detections.extend(detections);
                }
                Content::Parts(parts) => {
                    for (part_idx, part) in parts.iter_mut().enumerate() {
                        let Some(text) = part.text.clone() else {
                            continue;
                        };
                        let part_path = format!("{field_path}[{part_idx}]");
                        let (rewritten, detections, did_block) =
                            self.scan_and_apply(&part_path, &text);
                        if did_block {
                            blocked = true;
                        }
                        if !detections.is_empty() {
                            part.text = Some(rewritten);
                        }
                        all_detections.extend(detections);
                    }
                }
            }
        }

        for detection in &all_detections {
            let record = PiiLogRecord {
                request_id: req.id.to_string(),
                kind: detection.kind.to_string(),
                action: format!("{:?}", detection.action),
                field_path: detection.field_path.clone(),
                snippet: detection.snippet.clone(),
            };
            if let Err(err) = self.store.append(record).await {
                tracing::warn!(error = %err, "failed to persist pii log record");
            }
        }

        if blocked {
            return Err(ApiError::ValidationError(
                "request blocked: contains disallowed personally identifiable information"
                    .to_string(),
            ));
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
    use crate::{store::memory::MemoryStore, types::{Message, Role, WireFormat}};

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

    #[test]
    fn luhn_accepts_known_valid_number() {
        assert!(luhn_valid("4111111111111111"));
    }

    #[test]
    fn luhn_rejects_invalid_number() {
        assert!(!luhn_valid("4111111111111112"));
    }

    #[tokio::test]
    async fn email_is_redacted_by_default() {
        let mw = PiiMiddleware::new(PiiConfig::default(), Arc::new(MemoryStore::new()));
        let outcome = mw
            .process_request(&ctx(), request_with("contact me at jane@example.com please"))
            .await
            .unwrap();
        let req = match outcome {
            Outcome::Continue(req) => req,
            _ => unreachable!(),
        };
        assert!(req.messages[0].content.as_text().contains("[REDACTED_EMAIL]"));
        assert!(!req.messages[0].content.as_text().contains("jane@example.com"));
    }

    #[tokio::test]
    async fn ssn_blocks_by_default() {
        let mw = PiiMiddleware::new(PiiConfig::default(), Arc::new(MemoryStore::new()));
        let result = mw.process_request(&ctx(), request_with("my ssn is 123-45-6789")).await;
        assert!(matches!(result, Err(ApiError::ValidationError(_))));
    }
}
