//! Session inspection and per-stage cancellation (§6).

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use tarsy_domain::session::SessionStatus;
use tarsy_engine::repo::{self, SessionFilter};

use crate::api::error::{error_response, not_found};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    pub status: Option<SessionStatus>,
    pub alert_type: Option<String>,
    #[serde(default = "d_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn d_limit() -> i64 {
    50
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<ListSessionsQuery>,
) -> impl IntoResponse {
    let filter = SessionFilter {
        status: query.status,
        alert_type: query.alert_type,
        limit: query.limit,
        offset: query.offset,
    };

    match repo::list_sessions(&state.pool, &filter).await {
        Ok(sessions) => Json(serde_json::json!({
            "sessions": sessions,
            "count": sessions.len(),
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /sessions/{id}
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    let session = match repo::get_session(&state.pool, session_id).await {
        Ok(Some(s)) => s,
        Ok(None) => return not_found("session not found"),
        Err(e) => return error_response(&e),
    };

    let stages = match repo::list_stage_executions(&state.pool, session_id).await {
        Ok(s) => s,
        Err(e) => return error_response(&e),
    };
    let llm_interactions = match repo::list_llm_interactions(&state.pool, session_id).await {
        Ok(i) => i,
        Err(e) => return error_response(&e),
    };
    let mcp_interactions = match repo::list_mcp_interactions(&state.pool, session_id).await {
        Ok(i) => i,
        Err(e) => return error_response(&e),
    };

    Json(serde_json::json!({
        "session": session,
        "stages": stages,
        "llm_interactions": llm_interactions,
        "mcp_interactions": mcp_interactions,
    }))
    .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /sessions/{id}/stages/{stage_id}/cancel
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn cancel_stage(
    State(state): State<AppState>,
    Path((session_id, stage_id)): Path<(Uuid, Uuid)>,
) -> impl IntoResponse {
    let stage = match repo::get_stage_execution(&state.pool, stage_id).await {
        Ok(Some(s)) if s.session_id == session_id => s,
        Ok(_) => return not_found("stage execution not found for this session"),
        Err(e) => return error_response(&e),
    };

    // §4.7: per-child cancellation and session-level cancellation both
    // route through `mark_cancelled`; marking the session too ensures a
    // top-level "single" stage's cancel also stops the chain loop.
    state.cancellation.mark_cancelled(session_id);
    state.orchestrator.cancel_stage(stage_id);

    let session = match repo::get_session(&state.pool, session_id).await {
        Ok(Some(s)) => s,
        Ok(None) => return not_found("session not found"),
        Err(e) => return error_response(&e),
    };

    Json(serde_json::json!({
        "success": true,
        "session_status": session.status,
        "stage_status": stage.status,
    }))
    .into_response()
}
