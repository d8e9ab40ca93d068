//! Interaction Log (C2, §4.2): typed recording of every LLM/MCP call.
//!
//! Writes are synchronous to the database (callers `.await` them) but
//! fire-and-forget from the calling controller's perspective: a failed log
//! write is reported via `tracing::error!` and otherwise swallowed, never
//! propagated as a stage failure — losing an audit row must not abort an
//! otherwise-successful investigation.

use uuid::Uuid;

use tarsy_domain::interaction::{LlmInteraction, McpCommunicationType, McpInteraction};

use crate::clock::now_us;
use crate::db::{with_retry, Pool, Retry};

fn communication_type_str(t: McpCommunicationType) -> &'static str {
    match t {
        McpCommunicationType::ToolList => "tool_list",
        McpCommunicationType::ToolCall => "tool_call",
    }
}

pub struct InteractionLog {
    pool: Pool,
}

impl InteractionLog {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Record one LLM call. Always touches the parent session's
    /// `last_interaction_at_us` afterward (§4.2 "derived contract"),
    /// best-effort.
    pub async fn log_llm(&self, interaction: LlmInteraction) {
        let session_id = interaction.session_id;
        let result = with_retry(Retry::Transient, "interaction_log.log_llm", || {
            let pool = self.pool.clone();
            let i = interaction.clone();
            async move {
                sqlx::query(
                    "INSERT INTO llm_interactions (
                        interaction_id, session_id, stage_execution_id, mcp_event_id,
                        model_name, request_json, response_json, token_usage,
                        tool_calls, tool_results, duration_ms, success, error, timestamp_us
                    ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)",
                )
                .bind(i.interaction_id)
                .bind(i.session_id)
                .bind(i.stage_execution_id)
                .bind(i.mcp_event_id)
                .bind(&i.model_name)
                .bind(&i.request_json)
                .bind(&i.response_json)
                .bind(&i.token_usage)
                .bind(&i.tool_calls)
                .bind(&i.tool_results)
                .bind(i.duration_ms)
                .bind(i.success)
                .bind(&i.error)
                .bind(i.timestamp_us)
                .execute(&pool)
                .await
            }
        })
        .await;

        if let Err(e) = result {
            tracing::error!(%session_id, error = %e, "failed to persist LLM interaction");
        }

        self.touch_session(session_id).await;
    }

    /// Record one MCP call (tool invocation or tool listing).
    pub async fn log_mcp_call(&self, interaction: McpInteraction) {
        self.log_mcp(interaction).await;
    }

    /// Record an MCP tool-list lookup. Identical storage path to
    /// `log_mcp_call`; kept as a distinct entry point per §4.2's naming so
    /// callers don't have to construct the right `communication_type`
    /// themselves.
    pub async fn log_mcp_list(&self, mut interaction: McpInteraction) {
        interaction.communication_type = McpCommunicationType::ToolList;
        self.log_mcp(interaction).await;
    }

    async fn log_mcp(&self, interaction: McpInteraction) {
        let session_id = interaction.session_id;
        let result = with_retry(Retry::Transient, "interaction_log.log_mcp", || {
            let pool = self.pool.clone();
            let i = interaction.clone();
            async move {
                sqlx::query(
                    "INSERT INTO mcp_interactions (
                        interaction_id, session_id, stage_execution_id, server_name,
                        communication_type, tool_name, tool_arguments, tool_result,
                        available_tools, duration_ms, success, error, timestamp_us
                    ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)",
                )
                .bind(i.interaction_id)
                .bind(i.session_id)
                .bind(i.stage_execution_id)
                .bind(&i.server_name)
                .bind(communication_type_str(i.communication_type))
                .bind(&i.tool_name)
                .bind(&i.tool_arguments)
                .bind(&i.tool_result)
                .bind(&i.available_tools)
                .bind(i.duration_ms)
                .bind(i.success)
                .bind(&i.error)
                .bind(i.timestamp_us)
                .execute(&pool)
                .await
            }
        })
        .await;

        if let Err(e) = result {
            tracing::error!(%session_id, error = %e, "failed to persist MCP interaction");
        }

        self.touch_session(session_id).await;
    }

    /// §4.6 "Heartbeat recording": update liveness without logging an
    /// interaction. Exposed standalone for controllers blocked on something
    /// with nothing to log yet.
    pub async fn record_session_interaction(&self, session_id: Uuid) {
        self.touch_session(session_id).await;
    }

    async fn touch_session(&self, session_id: Uuid) {
        let now = now_us();
        let result = sqlx::query(
            "UPDATE alert_sessions SET last_interaction_at_us = $1 WHERE session_id = $2",
        )
        .bind(now)
        .bind(session_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(%session_id, error = %e, "failed to update session heartbeat");
        }
    }
}
