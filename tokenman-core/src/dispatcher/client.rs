//! Builds the pooled [`reqwest::Client`] shared by every provider and
//! attaches each provider's own authentication headers. TokenMan holds
//! its own upstream credentials (configured per provider) rather than
//! forwarding whatever the caller presented — it is a single-tenant
//! local proxy, not a multi-tenant credential broker.

use reqwest::RequestBuilder;

use crate::{
    config::{DispatcherConfig, ProviderConfig},
    error::InitError,
    types::InferenceProvider,
};

pub fn build_pooled_client(config: &DispatcherConfig) -> Result<reqwest::Client, InitError> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .tcp_nodelay(true)
        .build()
        .map_err(|source| InitError::StoreOpen {
            path: "reqwest::Client".to_string(),
            source: sqlx::Error::Configuration(Box::new(source)),
        })
}

/// Attaches provider-specific auth headers to an outbound request.
pub fn authenticate(
    builder: RequestBuilder,
    provider: InferenceProvider,
    provider_config: &ProviderConfig,
) -> RequestBuilder {
    let key = provider_config.api_key.expose();
    match provider {
        InferenceProvider::Anthropic => builder
            .header("x-api-key", key)
            .header("anthropic-version", "2023-06-01"),
        InferenceProvider::OpenAi => builder.bearer_auth(key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Secret;

    #[test]
    fn anthropic_gets_x_api_key_header() {
        let client = reqwest::Client::new();
        let provider_config = ProviderConfig {
            provider: InferenceProvider::Anthropic,
            enabled: true,
            api_key: Secret::new("sk-test".to_string()),
            base_url: None,
        };
        let builder = authenticate(
            client.post("https://api.anthropic.com/v1/messages"),
            InferenceProvider::Anthropic,
            &provider_config,
        );
        let request = builder.build().unwrap();
        assert_eq!(
            request.headers().get("x-api-key").unwrap(),
            "sk-test"
        );
    }
}
