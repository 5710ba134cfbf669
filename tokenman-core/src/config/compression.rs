use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub dedup_enabled: bool,
    pub dedup_threshold: u32,
    pub rules: RuleToggles,
    pub history_window_size: usize,
    pub heartbeat: HeartbeatConfig,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            dedup_enabled: true,
            dedup_threshold: 2,
            rules: RuleToggles::default(),
            history_window_size: 20,
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleToggles {
    pub collapse_whitespace: bool,
    pub minify_json: bool,
    pub minify_xml: bool,
    pub dedup_instructions: bool,
    pub strip_markdown: bool,
}

impl Default for RuleToggles {
    fn default() -> Self {
        Self {
            collapse_whitespace: true,
            minify_json: true,
            minify_xml: false,
            dedup_instructions: true,
            strip_markdown: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub dedup_window_secs: u64,
    pub heartbeat_model: Option<String>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dedup_window_secs: 30,
            heartbeat_model: None,
        }
    }
}
