use displaydoc::Display;
use thiserror::Error;

/// Everything that should never reach a client verbatim. Middlewares and
/// stores produce these; the pipeline converts them to
/// [`crate::error::ApiError::Internal`] before they leave the process.
#[derive(Debug, Error, Display)]
pub enum InternalError {
    /// store operation failed: {0}
    Store(#[from] sqlx::Error),
    /// JSON (de)serialization failed: {0}
    Json(#[from] serde_json::Error),
    /// a middleware panicked: {middleware}
    Panic { middleware: String },
    /// upstream transport error: {0}
    Transport(#[from] reqwest::Error),
}

impl InternalError {
    pub fn panic(middleware: impl Into<String>) -> Self {
        InternalError::Panic {
            middleware: middleware.into(),
        }
    }
}

impl From<InternalError> for crate::error::ApiError {
    fn from(err: InternalError) -> Self {
        match &err {
            InternalError::Panic { middleware } => {
                crate::error::ApiError::internal(middleware.clone(), err.to_string())
            }
            _ => crate::error::ApiError::internal("store", err.to_string()),
        }
    }
}
