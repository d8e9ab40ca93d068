//! Provider registry.
//!
//! Constructs and holds all configured LLM provider instances. A provider
//! that fails to initialize (e.g. missing API key env var) is recorded as a
//! warning rather than aborting startup (§11 "Warnings registry surface").

use crate::anthropic::AnthropicProvider;
use crate::mock::MockProvider;
use crate::traits::LlmProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tarsy_domain::config::{ProviderKind, ProvidersConfig};

/// Records a provider that failed to initialize; surfaced via
/// `GET /system/warnings` (§11).
#[derive(Debug, Clone)]
pub struct ProviderInitError {
    pub provider_id: String,
    pub error: String,
}

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    init_errors: Vec<ProviderInitError>,
}

impl ProviderRegistry {
    /// Build the registry from the application's [`ProvidersConfig`].
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        let mut init_errors = Vec::new();

        for pc in &config.providers {
            let result: tarsy_domain::error::Result<Arc<dyn LlmProvider>> = match pc.kind {
                ProviderKind::Anthropic => {
                    AnthropicProvider::from_config(pc).map(|p| Arc::new(p) as Arc<dyn LlmProvider>)
                }
                ProviderKind::Mock => {
                    Ok(Arc::new(MockProvider::new(pc.id.clone())) as Arc<dyn LlmProvider>)
                }
            };

            match result {
                Ok(provider) => {
                    tracing::info!(provider_id = %pc.id, kind = ?pc.kind, "registered LLM provider");
                    providers.insert(pc.id.clone(), provider);
                }
                Err(e) => {
                    tracing::warn!(provider_id = %pc.id, kind = ?pc.kind, error = %e, "failed to initialize LLM provider, skipping");
                    init_errors.push(ProviderInitError {
                        provider_id: pc.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Self {
            providers,
            init_errors,
        }
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn init_errors(&self) -> &[ProviderInitError] {
        &self.init_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarsy_domain::config::ProviderConfig;

    fn mock_cfg(id: &str) -> ProviderConfig {
        ProviderConfig {
            id: id.into(),
            kind: ProviderKind::Mock,
            base_url: "http://localhost".into(),
            api_key_env: "UNUSED".into(),
            default_model: None,
        }
    }

    #[test]
    fn mock_provider_always_initializes() {
        let cfg = ProvidersConfig {
            providers: vec![mock_cfg("mock")],
        };
        let registry = ProviderRegistry::from_config(&cfg);
        assert_eq!(registry.len(), 1);
        assert!(registry.init_errors().is_empty());
        assert!(registry.get("mock").is_some());
    }

    #[test]
    fn anthropic_without_api_key_env_records_init_error() {
        let cfg = ProvidersConfig {
            providers: vec![ProviderConfig {
                id: "claude".into(),
                kind: ProviderKind::Anthropic,
                base_url: "https://api.anthropic.com".into(),
                api_key_env: "TARSY_TEST_MISSING_ANTHROPIC_KEY".into(),
                default_model: None,
            }],
        };
        let registry = ProviderRegistry::from_config(&cfg);
        assert!(registry.get("claude").is_none());
        assert_eq!(registry.init_errors().len(), 1);
    }

    #[test]
    fn unknown_provider_id_returns_none() {
        let registry = ProviderRegistry::from_config(&ProvidersConfig::default());
        assert!(registry.get("missing").is_none());
        assert!(registry.is_empty());
    }
}
