//! MCP configuration types — re-exported from `tarsy-domain`.
//!
//! The canonical definitions live in `tarsy_domain::config` so that the
//! server's config deserializer can include them without depending on the
//! full MCP client crate. Shape and validation tests live alongside the
//! definitions there; this module is a re-export only.

pub use tarsy_domain::config::{McpConfig, McpServerConfig, McpTransportConfig};
