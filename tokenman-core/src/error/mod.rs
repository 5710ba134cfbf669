pub mod api;
pub mod init;
pub mod internal;

pub use api::{ApiError, ApiErrorMetric};
pub use init::InitError;
pub use internal::InternalError;
