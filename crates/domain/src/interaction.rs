use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// MCP tool-list calls for "all servers" use this sentinel in place of a
/// real server name (§4.2).
pub const ALL_SERVERS_SENTINEL: &str = "all_servers";

/// Immutable record of one LLM call, linked to its session and (if any)
/// stage (§3 "LLM Interaction").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmInteraction {
    pub interaction_id: Uuid,
    pub session_id: Uuid,
    pub stage_execution_id: Option<Uuid>,
    pub mcp_event_id: Option<Uuid>,
    pub model_name: String,
    pub request_json: serde_json::Value,
    pub response_json: Option<serde_json::Value>,
    pub token_usage: Option<serde_json::Value>,
    pub tool_calls: Option<serde_json::Value>,
    pub tool_results: Option<serde_json::Value>,
    pub duration_ms: i64,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp_us: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpCommunicationType {
    ToolList,
    ToolCall,
}

/// Immutable record of one MCP call (tool listing or tool invocation),
/// linked to its session and (if any) stage (§3 "MCP Interaction").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpInteraction {
    pub interaction_id: Uuid,
    pub session_id: Uuid,
    pub stage_execution_id: Option<Uuid>,
    pub server_name: String,
    pub communication_type: McpCommunicationType,
    pub tool_name: Option<String>,
    pub tool_arguments: Option<serde_json::Value>,
    pub tool_result: Option<serde_json::Value>,
    pub available_tools: Option<serde_json::Value>,
    pub duration_ms: i64,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp_us: i64,
}

impl McpInteraction {
    /// Human-readable description used in log lines and warnings; the
    /// "all_servers" sentinel gets a distinct description from a
    /// single-server lookup.
    pub fn step_description(&self) -> String {
        match self.communication_type {
            McpCommunicationType::ToolList if self.server_name == ALL_SERVERS_SENTINEL => {
                "list tools across all servers".to_string()
            }
            McpCommunicationType::ToolList => format!("list tools on {}", self.server_name),
            McpCommunicationType::ToolCall => format!(
                "call {} on {}",
                self.tool_name.as_deref().unwrap_or("<unknown>"),
                self.server_name
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(server_name: &str, communication_type: McpCommunicationType, tool_name: Option<&str>) -> McpInteraction {
        McpInteraction {
            interaction_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            stage_execution_id: None,
            server_name: server_name.into(),
            communication_type,
            tool_name: tool_name.map(String::from),
            tool_arguments: None,
            tool_result: None,
            available_tools: None,
            duration_ms: 10,
            success: true,
            error: None,
            timestamp_us: 0,
        }
    }

    #[test]
    fn all_servers_sentinel_description() {
        let i = base(ALL_SERVERS_SENTINEL, McpCommunicationType::ToolList, None);
        assert_eq!(i.step_description(), "list tools across all servers");
    }

    #[test]
    fn single_server_tool_list_description() {
        let i = base("kubectl", McpCommunicationType::ToolList, None);
        assert_eq!(i.step_description(), "list tools on kubectl");
    }

    #[test]
    fn tool_call_description() {
        let i = base("kubectl", McpCommunicationType::ToolCall, Some("get_pods"));
        assert_eq!(i.step_description(), "call get_pods on kubectl");
    }
}
