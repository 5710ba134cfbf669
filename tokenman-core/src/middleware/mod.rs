pub mod cache;
pub mod compression;
pub mod security;

use sha2::{Digest, Sha256};

use crate::types::{Message, Tool};

/// `SHA-256(model || 0x00 || canonical_json(messages) || 0x00 || canonical_json(tools))`,
/// hex-encoded. `serde_json` serializes struct fields in declaration
/// order and map keys are inserted in parse order for our `extras`
/// sidecars, so two requests built from identical JSON bodies always
/// canonicalize identically.
pub fn cache_key(model: &str, messages: &[Message], tools: &[Tool]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(serde_json::to_vec(messages).expect("messages always serialize"));
    hasher.update([0u8]);
    hasher.update(serde_json::to_vec(tools).expect("tools always serialize"));
    encode_hex(hasher.finalize())
}

fn encode_hex(bytes: impl AsRef<[u8]>) -> String {
    use std::fmt::Write;
    bytes.as_ref().iter().fold(String::new(), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str) -> Message {
        Message {
            role: crate::types::Role::User,
            content: crate::types::Content::Text(text.to_string()),
            extras: serde_json::Map::new(),
        }
    }

    #[test]
    fn identical_inputs_hash_identically() {
        let a = cache_key("claude-sonnet-4", &[msg("hi")], &[]);
        let b = cache_key("claude-sonnet-4", &[msg("hi")], &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_models_hash_differently() {
        let a = cache_key("claude-sonnet-4", &[msg("hi")], &[]);
        let b = cache_key("gpt-4o", &[msg("hi")], &[]);
        assert_ne!(a, b);
    }
}
