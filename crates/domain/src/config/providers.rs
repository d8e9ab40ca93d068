use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One entry of the `[[providers]]` list. `api_key_env` names the
/// environment variable holding the credential; the key itself is never
/// read from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    pub api_key_env: String,
    #[serde(default)]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    Mock,
}

fn d_base_url() -> String {
    "https://api.anthropic.com".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl ProvidersConfig {
    pub fn get(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_has_no_providers() {
        let cfg: ProvidersConfig = toml::from_str("").unwrap();
        assert!(cfg.providers.is_empty());
    }

    #[test]
    fn lookup_by_id() {
        let cfg = ProvidersConfig {
            providers: vec![ProviderConfig {
                id: "claude".into(),
                kind: ProviderKind::Anthropic,
                base_url: d_base_url(),
                api_key_env: "ANTHROPIC_API_KEY".into(),
                default_model: Some("claude-sonnet-4-20250514".into()),
            }],
        };
        assert!(cfg.get("claude").is_some());
        assert!(cfg.get("missing").is_none());
    }
}
