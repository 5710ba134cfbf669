use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// The upstream inference providers TokenMan can dispatch to. Each format
/// is proxied within itself — there is no cross-format translation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum InferenceProvider {
    Anthropic,
    OpenAi,
}

impl InferenceProvider {
    /// The wire format this provider speaks, used for request/response
    /// shaping and ingress path routing.
    pub fn wire_format(self) -> WireFormat {
        match self {
            InferenceProvider::Anthropic => WireFormat::Anthropic,
            InferenceProvider::OpenAi => WireFormat::OpenAi,
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            InferenceProvider::Anthropic => "https://api.anthropic.com",
            InferenceProvider::OpenAi => "https://api.openai.com",
        }
    }

    /// The upstream path this provider expects a chat/messages call on.
    pub fn chat_path(self) -> &'static str {
        match self {
            InferenceProvider::Anthropic => "/v1/messages",
            InferenceProvider::OpenAi => "/v1/chat/completions",
        }
    }
}

/// The shape of the request/response bodies a caller speaks, detected
/// from the ingress path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WireFormat {
    Anthropic,
    OpenAi,
}
