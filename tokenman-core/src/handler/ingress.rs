//! Request-side of the HTTP boundary: format detection, JSON parse, the
//! pass-through header capture the dispatcher needs (§4.9).

use http::{HeaderMap, HeaderName};

use crate::{
    codec,
    error::ApiError,
    types::{InferenceProvider, Request, WireFormat},
};

/// Headers the dispatcher forwards upstream verbatim rather than
/// re-deriving: version/beta pins and distributed-trace propagation.
/// TokenMan authenticates upstream itself (see `dispatcher::client`), so
/// `x-api-key`/`Authorization` are deliberately not in this list.
const PASSTHROUGH_HEADERS: &[&str] = ["anthropic-version", "anthropic-beta", "traceparent", "tracestate"].as_slice();

pub fn capture_passthrough_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for name in PASSTHROUGH_HEADERS {
        let Ok(header_name) = HeaderName::try_from(*name) else {
            continue;
        };
        if let Some(value) = headers.get(&header_name) {
            out.insert(header_name, value.clone());
        }
    }
    out
}

pub fn decode(format: WireFormat, body: &[u8], max_body_size: usize) -> Result<Request, ApiError> {
    if body.len() > max_body_size {
        return Err(ApiError::ValidationError(format!(
            "request body of {} bytes exceeds the {max_body_size} byte limit",
            body.len()
        )));
    }
    codec::decode(format, body)
}

/// Stamps `resolved_provider` into request metadata before the pipeline
/// runs, so [`crate::middleware::security::RateLimitMiddleware`] can
/// admit against the provider this call will actually dispatch to.
pub fn stamp_resolved_provider(req: &mut Request, providers: &[InferenceProvider]) {
    if let Some(primary) = providers.first() {
        req.metadata.insert(
            "resolved_provider".to_string(),
            serde_json::Value::String(primary.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_only_known_passthrough_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("anthropic-version", "2023-06-01".parse().unwrap());
        headers.insert("x-api-key", "should-not-pass".parse().unwrap());
        let captured = capture_passthrough_headers(&headers);
        assert_eq!(captured.get("anthropic-version").unwrap(), "2023-06-01");
        assert!(captured.get("x-api-key").is_none());
    }

    #[test]
    fn oversized_body_is_rejected() {
        let err = decode(WireFormat::Anthropic, &[0u8; 16], 8).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
    }
}
