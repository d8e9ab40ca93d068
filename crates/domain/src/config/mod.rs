mod agents;
mod chains;
mod database;
mod event_bus;
mod mcp;
mod observability;
mod providers;
mod server;
mod sessions;

pub use agents::*;
pub use chains::*;
pub use database::*;
pub use event_bus::*;
pub use mcp::*;
pub use observability::*;
pub use providers::*;
pub use server::*;
pub use sessions::*;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub event_bus: EventBusConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub chains: ChainsConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_all_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.sessions.session_timeout_s, 3_600);
        assert!(cfg.agents.definitions.is_empty());
        assert!(cfg.chains.chains.is_empty());
    }
}
