//! `tarsy-mcp-client` — MCP (Model Context Protocol) client.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types for communicating with MCP servers.
//! - A stdio transport that spawns child processes and an HTTP transport
//!   for remote MCP servers.
//! - An `McpManager` that manages connections to multiple MCP servers and
//!   orchestrates tool discovery and dispatch (§6).
//!
//! # Usage
//!
//! ```rust,ignore
//! use tarsy_mcp_client::{McpConfig, McpManager};
//!
//! let config: McpConfig = /* from TOML */;
//! let manager = McpManager::from_config(&config).await;
//!
//! for (server_id, tool) in manager.list_tools(session_id, None) {
//!     println!("mcp:{server_id}:{}", tool.name);
//! }
//!
//! let result = manager.call_tool(session_id, "kubectl", "get_pods", json!({})).await?;
//! ```

pub mod config;
pub mod manager;
pub mod protocol;
pub mod transport;

pub use config::{McpConfig, McpServerConfig, McpTransportConfig};
pub use manager::{McpError, McpManager};
pub use protocol::McpToolDef;
