//! MCP (Model Context Protocol) configuration types for the domain layer.
//!
//! These are lightweight config structs used to deserialize the `[mcp]`
//! section of the server config. The actual MCP client logic lives in
//! the `tarsy-mcp-client` crate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level MCP configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

/// Configuration for a single MCP server connection (§6: "Supports stdio
/// (command+args+env) and HTTP (url+bearer+headers+verify_ssl)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Unique identifier for this server (matches the `server` field of a
    /// ReAct tool call).
    pub id: String,

    #[serde(flatten)]
    pub transport: McpTransportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum McpTransportConfig {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Http {
        url: String,
        /// Bearer token sent as `Authorization: Bearer <token>`. A
        /// manually set `Authorization` header in `headers` is rejected
        /// at load time — see `McpServerConfig::validate`.
        #[serde(default)]
        bearer_token: Option<String>,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default = "d_true")]
        verify_ssl: bool,
    },
}

fn d_true() -> bool {
    true
}

impl McpServerConfig {
    /// §6: HTTP transport disallows a manually set `Authorization` header;
    /// bearer auth must go through `bearer_token`.
    pub fn validate(&self) -> Result<(), String> {
        if let McpTransportConfig::Http { headers, .. } = &self.transport {
            if headers.keys().any(|k| k.eq_ignore_ascii_case("authorization")) {
                return Err(format!(
                    "mcp server '{}': Authorization header must not be set manually; use bearer_token",
                    self.id
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_defaults() {
        let cfg: McpConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.servers.is_empty());
    }

    #[test]
    fn deserialize_stdio_server() {
        let raw = r#"{
            "id": "kubectl",
            "transport": "stdio",
            "command": "kubectl-mcp",
            "args": ["--readonly"]
        }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.id, "kubectl");
        match cfg.transport {
            McpTransportConfig::Stdio { command, args, .. } => {
                assert_eq!(command, "kubectl-mcp");
                assert_eq!(args, vec!["--readonly"]);
            }
            _ => panic!("expected stdio transport"),
        }
    }

    #[test]
    fn deserialize_http_server() {
        let raw = r#"{
            "id": "runbooks",
            "transport": "http",
            "url": "https://runbooks.internal/mcp",
            "bearer_token": "secret",
            "verify_ssl": true
        }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn manual_authorization_header_rejected() {
        let cfg = McpServerConfig {
            id: "runbooks".into(),
            transport: McpTransportConfig::Http {
                url: "https://runbooks.internal/mcp".into(),
                bearer_token: None,
                headers: HashMap::from([("Authorization".into(), "Bearer x".into())]),
                verify_ssl: true,
            },
        };
        assert!(cfg.validate().is_err());
    }
}
