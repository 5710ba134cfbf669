use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionAction {
    Log,
    Warn,
    Sanitize,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiAction {
    Redact,
    Hash,
    Log,
    Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    Email,
    Phone,
    Ssn,
    CreditCard,
    ApiKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectionConfig {
    pub enabled: bool,
    pub action: InjectionAction,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            action: InjectionAction::Warn,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PiiConfig {
    pub enabled: bool,
    pub actions: std::collections::HashMap<String, PiiAction>,
}

impl Default for PiiConfig {
    fn default() -> Self {
        let mut actions = std::collections::HashMap::new();
        actions.insert("email".to_string(), PiiAction::Redact);
        actions.insert("phone".to_string(), PiiAction::Redact);
        actions.insert("ssn".to_string(), PiiAction::Block);
        actions.insert("credit_card".to_string(), PiiAction::Block);
        actions.insert("api_key".to_string(), PiiAction::Hash);
        Self {
            enabled: true,
            actions,
        }
    }
}

impl PiiConfig {
    pub fn action_for(&self, kind: &str) -> PiiAction {
        self.actions.get(kind).copied().unwrap_or(PiiAction::Log)
    }
}
