//! OpenAI `/v1/chat/completions` wire shape. System content is just a
//! message with role `system` here, so decode/encode are a straighter
//! shot than the Anthropic side; the only wrinkle is that tools arrive
//! wrapped in `{"type":"function","function":{...}}`.

use serde_json::{Map, Value};
use uuid::Uuid;

use super::{content_from_value, content_to_value, estimate_tokens, role_from_str, role_to_str};
use crate::{
    error::ApiError,
    types::{Request, Tool, WireFormat},
};

pub fn decode(mut object: Map<String, Value>) -> Result<Request, ApiError> {
    let model = object
        .remove("model")
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| ApiError::ValidationError("missing \"model\"".to_string()))?;

    let Some(Value::Array(raw_messages)) = object.remove("messages") else {
        return Err(ApiError::ValidationError("missing \"messages\" array".to_string()));
    };

    let mut messages = Vec::with_capacity(raw_messages.len());
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
        messages.push(crate::types::Message {
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
            let kind_extras: Map<String, Value> = entry
                .iter()
                .filter(|(k, _)| k.as_str() != "type" && k.as_str() != "function")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let Some(Value::Object(mut function)) = entry.remove("function") else {
                return Err(ApiError::ValidationError(
                    "tool entry missing \"function\"".to_string(),
                ));
            };
            let name = function
                .remove("name")
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| ApiError::ValidationError("tool missing \"name\"".to_string()))?;
            let description = function.remove("description").and_then(|v| v.as_str().map(str::to_string));
            let parameters = function.remove("parameters").unwrap_or_else(|| Value::Object(Map::new()));
            let mut extras = kind_extras;
            extras.extend(function);
            tools.push(Tool {
                name,
                description,
                parameters,
                extras,
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
        wire_format: WireFormat::OpenAi,
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

    let messages: Vec<Value> = req
        .messages
        .iter()
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
                let mut function = tool.extras.clone();
                function.insert("name".to_string(), Value::String(tool.name.clone()));
                if let Some(description) = &tool.description {
                    function.insert("description".to_string(), Value::String(description.clone()));
                }
                function.insert("parameters".to_string(), tool.parameters.clone());
                let mut entry = Map::new();
                entry.insert("type".to_string(), Value::String("function".to_string()));
                entry.insert("function".to_string(), Value::Object(function));
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
    use crate::types::Role;

    fn body(json: &str) -> Map<String, Value> {
        match serde_json::from_str(json).unwrap() {
            Value::Object(object) => object,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn decodes_system_message_as_ordinary_message() {
        let req = decode(body(
            r#"{"model":"gpt-4o","messages":[{"role":"system","content":"be terse"},{"role":"user","content":"hi"}]}"#,
        ))
        .unwrap();
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
    }

    #[test]
    fn round_trips_function_tool_wrapper() {
        let req = decode(body(
            r#"{"model":"gpt-4o","messages":[{"role":"user","content":"hi"}],
               "tools":[{"type":"function","function":{"name":"lookup","description":"d","parameters":{"type":"object"}}}]}"#,
        ))
        .unwrap();
        assert_eq!(req.tools[0].name, "lookup");
        let value = encode(&req);
        assert_eq!(value["tools"][0]["type"], "function");
        assert_eq!(value["tools"][0]["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn preserves_unknown_top_level_fields() {
        let req = decode(body(
            r#"{"model":"gpt-4o","max_tokens":512,"messages":[{"role":"user","content":"hi"}]}"#,
        ))
        .unwrap();
        assert_eq!(req.extras.get("max_tokens").and_then(Value::as_i64), Some(512));
        let value = encode(&req);
        assert_eq!(value["max_tokens"], Value::from(512));
    }

    #[test]
    fn missing_messages_is_validation_error() {
        let err = decode(body(r#"{"model":"gpt-4o"}"#)).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
    }
}
