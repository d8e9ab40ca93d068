//! System introspection endpoints (§6, §11): health, warnings, MCP servers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use uuid::Uuid;

use tarsy_domain::interaction::{McpCommunicationType, McpInteraction, ALL_SERVERS_SENTINEL};
use tarsy_engine::clock::now_us;

use crate::state::AppState;

/// `GET /health` (public). Pings the database pool; 200 when reachable,
/// 503 when not, following §6's "healthy returns 200, degraded 503".
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();

    let status = if db_ok { "healthy" } else { "degraded" };
    let code = if db_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        code,
        Json(serde_json::json!({
            "service": "tarsy",
            "status": status,
            "timestamp_us": now_us(),
            "details": { "database": db_ok },
        })),
    )
}

/// `GET /system/warnings` (§11): non-fatal init failures accumulated at
/// startup (MCP servers or LLM providers that failed to come up).
pub async fn list_warnings(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "warnings": state.warnings.list() }))
}

/// `GET /system/mcp-servers` (§6/§11): configured servers, liveness, and the
/// tools each currently advertises, sourced from the MCP client's
/// `list_tools` contract. Logs one `tool_list` interaction under the
/// "all servers" sentinel (§4.2), since this call spans every server and
/// isn't scoped to one investigation session.
pub async fn list_mcp_servers(State(state): State<AppState>) -> impl IntoResponse {
    let start = now_us();
    let status = state.mcp.server_status();

    let servers: Vec<_> = status
        .iter()
        .map(|(id, alive, tools)| {
            let tools_json: Vec<_> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    })
                })
                .collect();
            serde_json::json!({
                "id": id,
                "alive": alive,
                "tool_count": tools.len(),
                "tools": tools_json,
            })
        })
        .collect();

    let available_tools: Vec<_> = status
        .iter()
        .flat_map(|(id, _, tools)| tools.iter().map(move |t| serde_json::json!({ "server": id, "name": t.name })))
        .collect();

    state
        .interactions
        .log_mcp_list(McpInteraction {
            interaction_id: Uuid::new_v4(),
            session_id: Uuid::nil(),
            stage_execution_id: None,
            server_name: ALL_SERVERS_SENTINEL.to_string(),
            communication_type: McpCommunicationType::ToolList,
            tool_name: None,
            tool_arguments: None,
            tool_result: None,
            available_tools: Some(serde_json::Value::Array(available_tools)),
            duration_ms: (now_us() - start) / 1_000,
            success: true,
            error: None,
            timestamp_us: start,
        })
        .await;

    Json(serde_json::json!({ "servers": servers }))
}
