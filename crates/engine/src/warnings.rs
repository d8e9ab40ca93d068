//! Warnings registry (§11 supplemental feature): an in-process accumulator
//! for non-fatal startup problems — an MCP server or LLM provider that
//! failed to initialize — surfaced read-only via `GET /system/warnings`.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::now_us;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    pub warning_id: Uuid,
    pub category: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub timestamp_us: i64,
}

#[derive(Default)]
pub struct WarningsRegistry {
    warnings: Mutex<Vec<Warning>>,
}

impl WarningsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, category: impl Into<String>, message: impl Into<String>, details: Option<serde_json::Value>) {
        self.warnings.lock().push(Warning {
            warning_id: Uuid::new_v4(),
            category: category.into(),
            message: message.into(),
            details,
            timestamp_us: now_us(),
        });
    }

    pub fn list(&self) -> Vec<Warning> {
        self.warnings.lock().clone()
    }

    /// Seeds the registry from MCP server init failures recorded at
    /// startup (§11).
    pub fn record_mcp_init_failures(&self, failures: &[(String, String)]) {
        for (server_id, error) in failures {
            self.push(
                "mcp_init",
                format!("MCP server '{server_id}' failed to initialize: {error}"),
                Some(serde_json::json!({ "server_id": server_id })),
            );
        }
    }

    /// Seeds the registry from LLM provider init failures recorded at
    /// startup (§11).
    pub fn record_provider_init_failures(&self, failures: &[tarsy_providers::registry::ProviderInitError]) {
        for f in failures {
            self.push(
                "provider_init",
                format!("LLM provider '{}' failed to initialize: {}", f.provider_id, f.error),
                Some(serde_json::json!({ "provider_id": f.provider_id })),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_list_warnings() {
        let registry = WarningsRegistry::new();
        assert!(registry.list().is_empty());
        registry.push("mcp_init", "kubectl failed to start", None);
        let warnings = registry.list();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].category, "mcp_init");
    }

    #[test]
    fn record_mcp_init_failures_pushes_one_per_entry() {
        let registry = WarningsRegistry::new();
        registry.record_mcp_init_failures(&[
            ("kubectl".to_string(), "connection refused".to_string()),
            ("grafana".to_string(), "timeout".to_string()),
        ]);
        assert_eq!(registry.list().len(), 2);
    }
}
