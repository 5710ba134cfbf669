use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::InferenceProvider;

/// A model name mapped to its primary provider plus an ordered list of
/// fallbacks, used by [`crate::router::Router::resolve`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub fallback_enabled: bool,
    pub models: HashMap<String, ModelRoute>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        let mut models = HashMap::new();
        models.insert(
            "claude-sonnet-4".to_string(),
            ModelRoute {
                providers: vec![InferenceProvider::Anthropic],
            },
        );
        models.insert(
            "gpt-4o".to_string(),
            ModelRoute {
                providers: vec![InferenceProvider::OpenAi],
            },
        );
        Self {
            fallback_enabled: true,
            models,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRoute {
    /// Primary provider first, fallbacks in priority order.
    pub providers: Vec<InferenceProvider>,
}
