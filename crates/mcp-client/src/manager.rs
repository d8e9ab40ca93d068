//! MCP manager — holds all MCP server connections and orchestrates tool
//! discovery and dispatch.

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use crate::protocol::{self, McpToolDef, ToolCallResult, ToolsListResult};
use crate::transport::{HttpTransport, McpTransport, StdioTransport, TransportError};
use tarsy_domain::config::{McpConfig, McpServerConfig, McpTransportConfig};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpServer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An MCP server connection (one per configured server).
pub struct McpServer {
    pub id: String,
    pub tools: Vec<McpToolDef>,
    transport: Box<dyn McpTransport>,
}

impl McpServer {
    /// Initialize a server: spawn the process (or open the HTTP transport),
    /// perform the MCP handshake, and discover tools.
    async fn initialize(config: &McpServerConfig) -> Result<Self, McpError> {
        if let Err(e) = config.validate() {
            return Err(McpError::Protocol(e));
        }

        let transport: Box<dyn McpTransport> = match &config.transport {
            McpTransportConfig::Stdio { command, args, env } => {
                let t = StdioTransport::spawn(command, args, env).map_err(McpError::Transport)?;
                Box::new(t)
            }
            McpTransportConfig::Http { .. } => {
                let t = HttpTransport::new(&config.transport).map_err(McpError::Transport)?;
                Box::new(t)
            }
        };

        let init_params = protocol::initialize_params();
        let params_value = serde_json::to_value(&init_params)
            .map_err(|e| McpError::Protocol(format!("failed to serialize initialize params: {e}")))?;

        let resp = transport
            .send_request("initialize", Some(params_value))
            .await
            .map_err(McpError::Transport)?;

        if resp.is_error() {
            let err = resp.error.unwrap();
            return Err(McpError::Protocol(format!("initialize failed: {err}")));
        }

        tracing::debug!(server_id = %config.id, "MCP initialize response received");

        transport
            .send_notification("notifications/initialized")
            .await
            .map_err(McpError::Transport)?;

        tracing::debug!(server_id = %config.id, "sent notifications/initialized");

        let tools_resp = transport
            .send_request("tools/list", None)
            .await
            .map_err(McpError::Transport)?;

        let tools = if tools_resp.is_error() {
            tracing::warn!(server_id = %config.id, "tools/list returned error, server will have no tools");
            Vec::new()
        } else {
            let result_value = tools_resp.result.unwrap_or(Value::Null);
            match serde_json::from_value::<ToolsListResult>(result_value) {
                Ok(r) => r.tools,
                Err(e) => {
                    tracing::warn!(server_id = %config.id, error = %e, "failed to parse tools/list result");
                    Vec::new()
                }
            }
        };

        tracing::info!(server_id = %config.id, tool_count = tools.len(), "MCP server initialized");

        Ok(Self {
            id: config.id.clone(),
            tools,
            transport,
        })
    }

    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        if !self.transport.is_alive() {
            return Err(McpError::ServerDown(self.id.clone()));
        }

        let params = serde_json::json!({ "name": tool_name, "arguments": arguments });

        let resp = self
            .transport
            .send_request("tools/call", Some(params))
            .await
            .map_err(McpError::Transport)?;

        if resp.is_error() {
            let err = resp.error.unwrap();
            return Err(McpError::Protocol(format!("tools/call failed: {err}")));
        }

        let result_value = resp.result.unwrap_or(Value::Null);
        serde_json::from_value::<ToolCallResult>(result_value)
            .map_err(|e| McpError::Protocol(format!("failed to parse tools/call result: {e}")))
    }

    async fn shutdown(&self) {
        tracing::info!(server_id = %self.id, "shutting down MCP server");
        self.transport.shutdown().await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpManager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Manager that holds all MCP server connections. `session_id` parameters
/// on its public methods are for tracing/log correlation only — discovery
/// and dispatch are process-wide, not session-scoped.
pub struct McpManager {
    servers: HashMap<String, McpServer>,
    /// Servers that failed to initialize; surfaced via `GET /system/warnings`.
    init_failures: Vec<(String, String)>,
}

impl McpManager {
    pub fn empty() -> Self {
        Self {
            servers: HashMap::new(),
            init_failures: Vec::new(),
        }
    }

    /// Initialize from config: spawn processes / open HTTP transports, send
    /// `initialize`, discover tools.
    ///
    /// Servers that fail to initialize are logged and skipped (not fatal) —
    /// their failures are retained for the warnings registry.
    pub async fn from_config(config: &McpConfig) -> Self {
        let mut servers = HashMap::new();
        let mut init_failures = Vec::new();

        for server_config in &config.servers {
            tracing::info!(server_id = %server_config.id, "initializing MCP server");

            match McpServer::initialize(server_config).await {
                Ok(server) => {
                    servers.insert(server_config.id.clone(), server);
                }
                Err(e) => {
                    tracing::warn!(server_id = %server_config.id, error = %e, "failed to initialize MCP server, skipping");
                    init_failures.push((server_config.id.clone(), e.to_string()));
                }
            }
        }

        if !servers.is_empty() {
            tracing::info!(count = servers.len(), "MCP manager ready");
        }

        Self { servers, init_failures }
    }

    /// Failures recorded during `from_config`, as `(server_id, message)`.
    pub fn init_failures(&self) -> &[(String, String)] {
        &self.init_failures
    }

    /// All discovered tools across alive servers, optionally scoped to one
    /// server name (§6: `list_tools(session_id, server_name?)`).
    pub fn list_tools(&self, session_id: Uuid, server_name: Option<&str>) -> Vec<(&str, &McpToolDef)> {
        tracing::debug!(%session_id, server_name, "listing MCP tools");
        self.servers
            .values()
            .filter(|s| s.is_alive())
            .filter(|s| server_name.map(|n| n == s.id).unwrap_or(true))
            .flat_map(|server| server.tools.iter().map(move |tool| (server.id.as_str(), tool)))
            .collect()
    }

    /// Call a tool on a specific server (§6: `call_tool(session_id, server,
    /// tool, args)`).
    pub async fn call_tool(
        &self,
        session_id: Uuid,
        server_id: &str,
        tool_name: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, McpError> {
        tracing::debug!(%session_id, server_id, tool_name, "calling MCP tool");
        let server = self
            .servers
            .get(server_id)
            .ok_or_else(|| McpError::ServerNotFound(server_id.to_string()))?;

        server.call_tool(tool_name, arguments).await
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    pub fn tool_count(&self) -> usize {
        self.servers.values().filter(|s| s.is_alive()).map(|s| s.tools.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Server ids, liveness, and discovered tools, for `GET
    /// /system/mcp-servers` (§6/§11: "configured servers and their
    /// advertised tools").
    pub fn server_status(&self) -> Vec<(&str, bool, &[McpToolDef])> {
        self.servers
            .values()
            .map(|s| (s.id.as_str(), s.is_alive(), s.tools.as_slice()))
            .collect()
    }

    pub async fn shutdown(&self) {
        let futs: Vec<_> = self.servers.values().map(|s| s.shutdown()).collect();
        futures_util::future::join_all(futs).await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP server not found: {0}")]
    ServerNotFound(String),

    #[error("MCP server is down: {0}")]
    ServerDown(String),
}

impl From<McpError> for tarsy_domain::taxonomy::ToolExecutionError {
    fn from(e: McpError) -> Self {
        let recoverable = !matches!(e, McpError::ServerNotFound(_));
        tarsy_domain::taxonomy::ToolExecutionError::new(e.to_string(), recoverable)
    }
}
