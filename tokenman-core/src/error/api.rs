use axum::Json;
use axum_core::response::{IntoResponse, Response};
use displaydoc::Display;
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// The typed error taxonomy surfaced to HTTP clients. Every variant maps
/// to exactly one status code; the body never leaks internal detail.
#[derive(Debug, Error, Display)]
pub enum ApiError {
    /// request body failed validation: {0}
    ValidationError(String),
    /// authentication failed
    AuthError,
    /// resource not found: {0}
    NotFound(String),
    /// budget exceeded for period {period}, retry after {retry_after_secs}s
    BudgetExceeded {
        period: String,
        retry_after_secs: u64,
    },
    /// rate limited, retry after {retry_after_secs}s
    RateLimited { retry_after_secs: u64 },
    /// upstream returned an error
    UpstreamError {
        status: StatusCode,
        body: String,
    },
    /// circuit open for provider {provider}
    CircuitOpen { provider: String },
    /// upstream timed out
    UpstreamTimeout,
    /// internal error in {middleware}: {message}
    Internal {
        middleware: String,
        message: String,
    },
}

impl ApiError {
    pub fn internal(middleware: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Internal {
            middleware: middleware.into(),
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::AuthError => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BudgetExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::UpstreamError { status, .. } => *status,
            ApiError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Low-cardinality type tag, stable across error instances, used in
    /// both the response body and metrics labels.
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::ValidationError(_) => "validation_error",
            ApiError::AuthError => "auth_error",
            ApiError::NotFound(_) => "not_found",
            ApiError::BudgetExceeded { .. } => "budget_exceeded",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::UpstreamError { .. } => "upstream_error",
            ApiError::CircuitOpen { .. } => "circuit_open",
            ApiError::UpstreamTimeout => "upstream_timeout",
            ApiError::Internal { .. } => "internal",
        }
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ApiError::BudgetExceeded {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            ApiError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// The message surfaced to the client. Internal errors are
    /// deliberately generic; everything else echoes its own detail.
    fn public_message(&self) -> String {
        match self {
            ApiError::Internal { .. } => "an internal error occurred".to_string(),
            ApiError::UpstreamError { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Serialize)]
struct ErrorDetails {
    #[serde(rename = "type")]
    kind: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, ApiError::Internal { .. }) {
            tracing::error!(error = %self, "internal error");
        }
        let status = self.status_code();
        let retry_after = self.retry_after_secs();
        let body = ErrorResponse {
            error: ErrorDetails {
                kind: self.error_type(),
                message: self.public_message(),
            },
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = http::HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Low-cardinality metric label companion, mirrored 1:1 with
/// [`ApiError`] variants but stripped of any per-request detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ApiErrorMetric {
    ValidationError,
    AuthError,
    NotFound,
    BudgetExceeded,
    RateLimited,
    UpstreamError,
    CircuitOpen,
    UpstreamTimeout,
    Internal,
}

impl From<&ApiError> for ApiErrorMetric {
    fn from(err: &ApiError) -> Self {
        match err {
            ApiError::ValidationError(_) => ApiErrorMetric::ValidationError,
            ApiError::AuthError => ApiErrorMetric::AuthError,
            ApiError::NotFound(_) => ApiErrorMetric::NotFound,
            ApiError::BudgetExceeded { .. } => ApiErrorMetric::BudgetExceeded,
            ApiError::RateLimited { .. } => ApiErrorMetric::RateLimited,
            ApiError::UpstreamError { .. } => ApiErrorMetric::UpstreamError,
            ApiError::CircuitOpen { .. } => ApiErrorMetric::CircuitOpen,
            ApiError::UpstreamTimeout => ApiErrorMetric::UpstreamTimeout,
            ApiError::Internal { .. } => ApiErrorMetric::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            ApiError::ValidationError("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::CircuitOpen {
                provider: "anthropic".into()
            }
            .status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ApiError::UpstreamTimeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn internal_errors_are_sanitized_for_clients() {
        let err = ApiError::internal("cache", "store connection poisoned");
        assert_eq!(err.public_message(), "an internal error occurred");
    }
}
