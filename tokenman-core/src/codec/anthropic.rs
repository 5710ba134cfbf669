//! Anthropic `/v1/messages` wire shape. System content lives in a
//! top-level `system` field rather than a message with role `system`;
//! this codec folds it into a leading synthesized message on the way in
//! and splits it back out on the way upstream, so the rest of the
//! pipeline (history window, dedup, rules) only ever has to reason
//! about one message list.

use serde_json::{Map, Value};
use uuid::Uuid;

use super::{content_from_value, content_to_value, estimate_tokens, role_from_str, role_to_str};
use crate::{
    error::ApiError,
    types::{Message, Request, Role, Tool, WireFormat},
};

pub fn decode(mut object: Map<String, Value>) -> Result<Request, ApiError> {
    let model = object
        .remove("model")
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| ApiError::ValidationError("missing \"model\"".to_string()))?;

    let Some(Value::Array(raw_messages)) = object.remove("messages") else {
        return Err(ApiError::ValidationError("missing \"messages\" array".to_string()));
    };

    let mut messages = Vec::with_capacity(raw_messages.len() + 1);
    if let Some(system) = object.remove("system") {
        messages.push(Message {
            role: Role::System,
            content: content_from_value(system),
            extras: Map::new(),
        });
    }
    for entry in raw_messages {
        let Value::Object(mut entry) = entry else {
            return Err(ApiError::ValidationError("message entry must be an object".to_string()));
        };
        let role = entry
            .remove("role")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| ApiError::ValidationError("message missing \"role\"".to_string()))?;
        let content = entry
            .remove("content")
            .ok_or_else(|| ApiError::ValidationError("message missing \"content\"".to_string()))?;
        messages.push(Message {
            role: role_from_str(&role)?,
            content: content_from_value(content),
            extras: entry,
        });
    }

    let mut tools = Vec::new();
    if let Some(Value::Array(raw_tools)) = object.remove("tools") {
        for entry in raw_tools {
            let Value::Object(mut entry) = entry else {
                return Err(ApiError::ValidationError("tool entry must be an object".to_string()));
            };
            let name = entry
                .remove("name")
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| ApiError::ValidationError("tool missing \"name\"".to_string()))?;
            let description = entry.remove("description").and_then(|v| v.as_str().map(str::to_string));
            let parameters = entry.remove("input_schema").unwrap_or_else(|| Value::Object(Map::new()));
            tools.push(Tool {
                name,
                description,
                parameters,
                extras: entry,
            });
        }
    }

    let stream = object
        .remove("stream")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let temperature = object.remove("temperature").and_then(|v| v.as_f64());

    let mut req = Request {
        id: Uuid::new_v4(),
        wire_format: WireFormat::Anthropic,
        model,
        messages,
        tools,
        stream,
        temperature,
        tokens_in: 0,
        flags: Default::default(),
        metadata: Default::default(),
        extras: object,
    };
    req.tokens_in = estimate_tokens(&req);
    Ok(req)
}

pub fn encode(req: &Request) -> Value {
    let mut object = req.extras.clone();
    object.insert("model".to_string(), Value::String(req.model.clone()));

    let system_text: Vec<&Message> = req
        .messages
        .iter()
        .take_while(|m| m.role == Role::System)
        .collect();
    if let Some(first) = system_text.first() {
        if system_text.len() == 1 {
            object.insert("system".to_string(), content_to_value(&first.content));
        } else {
            let joined = system_text
                .iter()
                .map(|m| m.content.as_text())
                .collect::<Vec<_>>()
                .join("\n\n");
            object.insert("system".to_string(), Value::String(joined));
        }
    }

    let messages: Vec<Value> = req
        .messages
        .iter()
        .skip(system_text.len())
        .map(|message| {
            let mut entry = message.extras.clone();
            entry.insert("role".to_string(), Value::String(role_to_str(message.role).to_string()));
            entry.insert("content".to_string(), content_to_value(&message.content));
            Value::Object(entry)
        })
        .collect();
    object.insert("messages".to_string(), Value::Array(messages));

    if !req.tools.is_empty() {
        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|tool| {
                let mut entry = tool.extras.clone();
                entry.insert("name".to_string(), Value::String(tool.name.clone()));
                if let Some(description) = &tool.description {
                    entry.insert("description".to_string(), Value::String(description.clone()));
                }
                entry.insert("input_schema".to_string(), tool.parameters.clone());
                Value::Object(entry)
            })
            .collect();
        object.insert("tools".to_string(), Value::Array(tools));
    }

    object.insert("stream".to_string(), Value::Bool(req.stream));
    if let Some(temperature) = req.temperature {
        if let Some(number) = serde_json::Number::from_f64(temperature) {
            object.insert("temperature".to_string(), Value::Number(number));
        }
    }

    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: &str) -> Map<String, Value> {
        match serde_json::from_str(json).unwrap() {
            Value::Object(object) => object,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn decodes_system_field_into_leading_message() {
        let req = decode(body(
            r#"{"model":"claude-sonnet-4","system":"be terse","messages":[{"role":"user","content":"hi"}]}"#,
        ))
        .unwrap();
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[0].content.as_text(), "be terse");
    }

    #[test]
    fn preserves_unknown_top_level_fields() {
        let req = decode(body(
            r#"{"model":"claude-sonnet-4","max_tokens":1024,"messages":[{"role":"user","content":"hi"}]}"#,
        ))
        .unwrap();
        assert_eq!(req.extras.get("max_tokens").and_then(Value::as_i64), Some(1024));
        let value = encode(&req);
        assert_eq!(value["max_tokens"], Value::from(1024));
    }

    #[test]
    fn round_trips_tool_input_schema() {
        let req = decode(body(
            r#"{"model":"claude-sonnet-4","messages":[{"role":"user","content":"hi"}],
               "tools":[{"name":"lookup","description":"d","input_schema":{"type":"object"}}]}"#,
        ))
        .unwrap();
        assert_eq!(req.tools[0].name, "lookup");
        let value = encode(&req);
        assert_eq!(value["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn missing_model_is_validation_error() {
        let err = decode(body(r#"{"messages":[]}"#)).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
    }
}
