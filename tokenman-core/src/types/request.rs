use std::collections::HashMap;

use serde_json::{Map, Value};
use uuid::Uuid;

use super::{
    message::{Message, Tool},
    provider::WireFormat,
};

/// A parsed representation of an inbound call. Created at ingress,
/// mutated by every middleware in the pipeline, destroyed after egress.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: Uuid,
    pub wire_format: WireFormat,
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
    pub stream: bool,
    /// Absent means "not set" — distinct from `Some(0.0)`.
    pub temperature: Option<f64>,
    pub tokens_in: u32,
    pub flags: HashMap<String, bool>,
    pub metadata: HashMap<String, Value>,
    /// Unrecognized top-level fields from the raw body, preserved
    /// verbatim and re-spliced on egress.
    pub extras: Map<String, Value>,
}

impl Request {
    /// `stream = false` AND (`temperature` absent OR `temperature = 0`).
    pub fn is_deterministic(&self) -> bool {
        !self.stream && self.temperature.map(|t| t == 0.0).unwrap_or(true)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn set_flag(&mut self, name: &str, value: bool) {
        self.flags.insert(name.to_string(), value);
    }
}
