pub mod body;
pub mod message;
pub mod provider;
pub mod request;
pub mod response;
pub mod secret;

pub use body::{Accumulated, StreamHandle};
pub use message::{Content, ContentPart, Message, Role, Tool};
pub use provider::{InferenceProvider, WireFormat};
pub use request::Request;
pub use response::{CachedResponse, Response, ResponseBody};
pub use secret::Secret;
