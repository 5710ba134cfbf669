use serde::{Deserialize, Serialize};

use crate::types::{InferenceProvider, Secret};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: InferenceProvider,
    pub enabled: bool,
    pub api_key: Secret<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ProviderConfig {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.base_url())
    }
}
