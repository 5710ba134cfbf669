//! Wire-format parse/emit for the two proxied formats. Each format is
//! handled entirely within itself (no Anthropic body is ever turned
//! into an OpenAI body); this module only picks which sibling codec
//! applies and carries the shared bits (extras preservation, the
//! `Request`/`Tool`/`Message` shapes already defined in `types`).

pub mod anthropic;
pub mod openai;

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::{
    error::ApiError,
    types::{Content, ContentPart, Request, Role, WireFormat},
};

/// Shared by both format codecs: Anthropic and OpenAI content blocks are
/// both either a bare string or an array of `{"type": ..., ...}` parts.
fn content_from_value(value: Value) -> Content {
    match value {
        Value::String(text) => Content::Text(text),
        Value::Array(items) => Content::Parts(
            items
                .into_iter()
                .map(|item| {
                    let mut object = match item {
                        Value::Object(object) => object,
                        other => {
                            let mut fallback = Map::new();
                            fallback.insert("type".to_string(), Value::String("text".to_string()));
                            fallback.insert("text".to_string(), other);
                            fallback
                        }
                    };
                    let kind = object
                        .remove("type")
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_else(|| "text".to_string());
                    let text = object.remove("text").and_then(|v| v.as_str().map(str::to_string));
                    let cache_control = object.remove("cache_control");
                    ContentPart {
                        kind,
                        text,
                        cache_control,
                        extras: object,
                    }
                })
                .collect(),
        ),
        other => Content::Text(other.to_string()),
    }
}

fn content_to_value(content: &Content) -> Value {
    match content {
        Content::Text(text) => Value::String(text.clone()),
        Content::Parts(parts) => Value::Array(
            parts
                .iter()
                .map(|part| {
                    let mut object = part.extras.clone();
                    object.insert("type".to_string(), Value::String(part.kind.clone()));
                    if let Some(text) = &part.text {
                        object.insert("text".to_string(), Value::String(text.clone()));
                    }
                    if let Some(cache_control) = &part.cache_control {
                        object.insert("cache_control".to_string(), cache_control.clone());
                    }
                    Value::Object(object)
                })
                .collect(),
        ),
    }
}

fn role_from_str(role: &str) -> Result<Role, ApiError> {
    match role {
        "system" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "tool" => Ok(Role::Tool),
        other => Err(ApiError::ValidationError(format!("unknown message role: {other}"))),
    }
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// `len/4` is the same rough heuristic the content-dedup middleware
/// already uses for fingerprint token counts; real accounting comes
/// from the provider's own usage block, read off the response.
fn estimate_tokens(req: &Request) -> u32 {
    let message_chars: usize = req.messages.iter().map(|m| m.content.as_text().len()).sum();
    let tool_chars: usize = req
        .tools
        .iter()
        .map(|t| t.name.len() + t.description.as_deref().map_or(0, str::len))
        .sum();
    ((message_chars + tool_chars) / 4) as u32
}

/// Resolves wire format from the ingress path, per spec: `/v1/messages`
/// is Anthropic, `/v1/chat/completions` is OpenAI. Any other path is not
/// a proxied endpoint.
pub fn wire_format_for_path(path: &str) -> Option<WireFormat> {
    match path {
        "/v1/messages" => Some(WireFormat::Anthropic),
        "/v1/chat/completions" => Some(WireFormat::OpenAi),
        _ => None,
    }
}

/// Parses a raw inbound body into a [`Request`], preserving every
/// unrecognized field (top-level and per-message/tool) verbatim in the
/// relevant `extras` sidecar.
pub fn decode(format: WireFormat, body: &[u8]) -> Result<Request, ApiError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|err| ApiError::ValidationError(format!("invalid JSON body: {err}")))?;
    let serde_json::Value::Object(object) = value else {
        return Err(ApiError::ValidationError(
            "request body must be a JSON object".to_string(),
        ));
    };
    match format {
        WireFormat::Anthropic => anthropic::decode(object),
        WireFormat::OpenAi => openai::decode(object),
    }
}

/// Re-serializes a [`Request`] back into the bytes sent upstream,
/// re-merging every extras sidecar so fields this core doesn't
/// understand still reach the provider untouched.
pub fn encode_for_upstream(req: &Request) -> Result<Bytes, ApiError> {
    let value = match req.wire_format {
        WireFormat::Anthropic => anthropic::encode(req),
        WireFormat::OpenAi => openai::encode(req),
    };
    serde_json::to_vec(&value)
        .map(Bytes::from)
        .map_err(|err| ApiError::internal("codec", format!("failed to serialize request: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_detects_anthropic() {
        assert_eq!(wire_format_for_path("/v1/messages"), Some(WireFormat::Anthropic));
    }

    #[test]
    fn path_detects_openai() {
        assert_eq!(
            wire_format_for_path("/v1/chat/completions"),
            Some(WireFormat::OpenAi)
        );
    }

    #[test]
    fn unknown_path_is_none() {
        assert_eq!(wire_format_for_path("/v1/models"), None);
    }
}
