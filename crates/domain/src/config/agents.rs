use crate::stage::IterationStrategy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent definitions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A named agent configuration: prompts, iteration strategy, and MCP
/// server whitelist (glossary: "Agent" — a named configuration bundling
/// prompts, an iteration strategy, and an MCP server whitelist).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,

    /// System prompt ("general instructions" in §4.3).
    pub general_instructions: String,

    /// Optional additional instructions layered on top of the general ones.
    #[serde(default)]
    pub custom_instructions: Option<String>,

    /// MCP servers this agent may call. Empty means no MCP access (fits
    /// synthesis/native-thinking controllers, which never need tools).
    #[serde(default)]
    pub mcp_servers: Vec<String>,

    pub iteration_strategy: IterationStrategy,

    /// Overrides provider-native tool behavior (e.g. built-in search);
    /// opaque to the core, forwarded to the LLM provider contract.
    #[serde(default)]
    pub native_tools_override: Option<NativeToolsOverride>,

    /// Name of the LLM provider this agent calls through, per the
    /// capability set in §9 ("an `Agent` capability set").
    #[serde(default)]
    pub llm_provider_name: Option<String>,

    /// Hard cap on ReAct iterations before `IterationLimitError`.
    #[serde(default = "d_max_iterations")]
    pub max_iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NativeToolsOverride {
    #[serde(default)]
    pub google_search: Option<bool>,
    #[serde(default)]
    pub code_execution: Option<bool>,
    #[serde(default)]
    pub url_context: Option<bool>,
}

fn d_max_iterations() -> u32 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentsConfig {
    #[serde(default)]
    pub definitions: HashMap<String, AgentDefinition>,
}

impl AgentsConfig {
    pub fn get(&self, name: &str) -> Option<&AgentDefinition> {
        self.definitions.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_max_iterations_is_20() {
        assert_eq!(d_max_iterations(), 20);
    }

    #[test]
    fn agents_config_lookup() {
        let mut definitions = HashMap::new();
        definitions.insert(
            "kubernetes".into(),
            AgentDefinition {
                name: "kubernetes".into(),
                general_instructions: "Investigate k8s alerts.".into(),
                custom_instructions: None,
                mcp_servers: vec!["kubectl".into()],
                iteration_strategy: IterationStrategy::React,
                native_tools_override: None,
                llm_provider_name: None,
                max_iterations: 20,
            },
        );
        let cfg = AgentsConfig { definitions };
        assert!(cfg.get("kubernetes").is_some());
        assert!(cfg.get("missing").is_none());
    }
}
