//! Response-side of the HTTP boundary: upstream usage accounting,
//! `X-Tokenman-Cache` tagging, and writing the final `axum` response.

use axum::{body::Body, response::IntoResponse};
use bytes::Bytes;
use http::{HeaderValue, StatusCode, header};

use crate::types::{CachedResponse, InferenceProvider, Response};

pub const CACHE_HEADER: &str = "x-tokenman-cache";

/// Reads the provider's own usage block when the buffered body parses as
/// JSON; falls back to the same `len/4` heuristic used at ingress when it
/// doesn't (e.g. an error body, or a provider extension this core has no
/// opinion on).
pub fn tokens_out_from_body(provider: InferenceProvider, body: &[u8]) -> u32 {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return (body.len() / 4) as u32;
    };
    let usage = value.get("usage");
    let counted = match provider {
        InferenceProvider::Anthropic => usage.and_then(|u| u.get("output_tokens")),
        InferenceProvider::OpenAi => usage.and_then(|u| u.get("completion_tokens")),
    };
    counted
        .and_then(serde_json::Value::as_u64)
        .map(|n| n as u32)
        .unwrap_or_else(|| (body.len() / 4) as u32)
}

pub fn cached_response_to_axum(cached: CachedResponse) -> axum::response::Response {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
    let mut response = (status, cached.body).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, content_type_header(&cached.content_type));
    response
        .headers_mut()
        .insert(CACHE_HEADER, HeaderValue::from_static("HIT"));
    response
}

pub fn buffered_response_to_axum(resp: Response, body: Bytes) -> axum::response::Response {
    let mut response = (resp.status, body).into_response();
    *response.headers_mut() = resp.headers;
    response
        .headers_mut()
        .insert(CACHE_HEADER, HeaderValue::from_static("MISS"));
    response
}

pub fn streaming_response_to_axum(
    status: StatusCode,
    headers: http::HeaderMap,
    body_stream: Body,
) -> axum::response::Response {
    let mut response = (status, body_stream).into_response();
    *response.headers_mut() = headers;
    response
        .headers_mut()
        .insert(CACHE_HEADER, HeaderValue::from_static("MISS"));
    response
}

fn content_type_header(content_type: &str) -> HeaderValue {
    HeaderValue::from_str(content_type).unwrap_or_else(|_| HeaderValue::from_static("application/json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_anthropic_output_tokens() {
        let body = br#"{"usage":{"output_tokens":42}}"#;
        assert_eq!(tokens_out_from_body(InferenceProvider::Anthropic, body), 42);
    }

    #[test]
    fn reads_openai_completion_tokens() {
        let body = br#"{"usage":{"completion_tokens":7}}"#;
        assert_eq!(tokens_out_from_body(InferenceProvider::OpenAi, body), 7);
    }

    #[test]
    fn falls_back_to_heuristic_on_unparseable_body() {
        let body = b"not json";
        assert_eq!(
            tokens_out_from_body(InferenceProvider::Anthropic, body),
            (body.len() / 4) as u32
        );
    }
}
