use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use super::body::StreamHandle;

/// Created by the Dispatcher, mutated by response-phase middlewares,
/// destroyed after egress.
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
    pub tokens_out: u32,
    /// Set when a buffered body exceeded `max_response_size` and was cut
    /// off before forwarding; streaming truncation is tracked separately
    /// on the stream's own [`super::body::Accumulated`].
    pub truncated: bool,
}

pub enum ResponseBody {
    Buffered(Bytes),
    Streaming(StreamHandle),
}

impl Response {
    pub fn is_cacheable_status(&self) -> bool {
        self.status.as_u16() >= 200 && self.status.as_u16() < 300
    }
}

/// An immutable record produced when the Cache middleware matches a key;
/// consumed by the Egress handler.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub body: Bytes,
    pub status: u16,
    pub content_type: String,
}
