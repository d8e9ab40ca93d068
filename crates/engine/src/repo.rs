//! Persistence helpers backing §3's conceptual tables: `alert_sessions`,
//! `stage_executions`, `chats`, `chat_user_messages`, `session_scores`.
//!
//! Rows are mapped by hand rather than via `#[derive(sqlx::FromRow)]`
//! because the domain enums (`SessionStatus`, `StageStatus`, ...) are
//! stored as plain TEXT columns and round-tripped through their
//! `serde`-derived snake_case representation rather than a dedicated
//! `sqlx::Type` impl — one conversion point instead of one per enum.

use serde_json::Value;
use sqlx::Row;
use uuid::Uuid;

use tarsy_domain::chat::{Chat, ChatMessageRole, ChatUserMessage};
use tarsy_domain::error::{Error, Result};
use tarsy_domain::interaction::{LlmInteraction, McpCommunicationType, McpInteraction};
use tarsy_domain::score::{ScoreStatus, SessionScore};
use tarsy_domain::session::{Session, SessionStatus};
use tarsy_domain::stage::{IterationStrategy, ParallelType, StageExecution, StageStatus};

use crate::db::{with_retry, Pool, Retry};

fn enum_to_text<T: serde::Serialize>(v: &T) -> String {
    serde_json::to_value(v)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .expect("taxonomy/domain enums serialize to a JSON string")
}

fn text_to_enum<T: serde::de::DeserializeOwned>(s: &str) -> Result<T> {
    serde_json::from_value(Value::String(s.to_string())).map_err(Error::Json)
}

fn row_err(e: sqlx::Error) -> Error {
    Error::Other(e.to_string())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Non-retriable per §5: a retried insert could double-submit an alert.
pub async fn create_session(pool: &Pool, session: &Session) -> Result<()> {
    with_retry(Retry::Never, "repo.create_session", || {
        let status = enum_to_text(&session.status);
        async move {
            sqlx::query(
                "INSERT INTO alert_sessions (
                    session_id, alert_type, alert_payload, status, started_at_us,
                    completed_at_us, pod_id, last_interaction_at_us, error
                ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
            )
            .bind(session.session_id)
            .bind(&session.alert_type)
            .bind(&session.alert_payload)
            .bind(&status)
            .bind(session.started_at_us)
            .bind(session.completed_at_us)
            .bind(&session.pod_id)
            .bind(session.last_interaction_at_us)
            .bind(&session.error)
            .execute(pool)
            .await
        }
    })
    .await
    .map(|_| ())
}

fn session_from_row(row: &sqlx::postgres::PgRow) -> Result<Session> {
    let status: String = row.try_get("status").map_err(row_err)?;
    Ok(Session {
        session_id: row.try_get("session_id").map_err(row_err)?,
        alert_type: row.try_get("alert_type").map_err(row_err)?,
        alert_payload: row.try_get("alert_payload").map_err(row_err)?,
        status: text_to_enum::<SessionStatus>(&status)?,
        started_at_us: row.try_get("started_at_us").map_err(row_err)?,
        completed_at_us: row.try_get("completed_at_us").map_err(row_err)?,
        pod_id: row.try_get("pod_id").map_err(row_err)?,
        last_interaction_at_us: row.try_get("last_interaction_at_us").map_err(row_err)?,
        error: row.try_get("error").map_err(row_err)?,
    })
}

pub async fn get_session(pool: &Pool, session_id: Uuid) -> Result<Option<Session>> {
    with_retry(Retry::Transient, "repo.get_session", || async move {
        sqlx::query("SELECT * FROM alert_sessions WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(pool)
            .await
    })
    .await?
    .as_ref()
    .map(session_from_row)
    .transpose()
}

/// Filter + pagination for `GET /sessions`. `status` and `alert_type` are
/// exact-match filters; `None` means unfiltered.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
    pub alert_type: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

pub async fn list_sessions(pool: &Pool, filter: &SessionFilter) -> Result<Vec<Session>> {
    let status = filter.status.map(|s| enum_to_text(&s));
    let rows = with_retry(Retry::Transient, "repo.list_sessions", || {
        let status = status.clone();
        let alert_type = filter.alert_type.clone();
        async move {
            sqlx::query(
                "SELECT * FROM alert_sessions
                 WHERE ($1::text IS NULL OR status = $1)
                   AND ($2::text IS NULL OR alert_type = $2)
                 ORDER BY started_at_us DESC
                 LIMIT $3 OFFSET $4",
            )
            .bind(status)
            .bind(alert_type)
            .bind(filter.limit.max(1))
            .bind(filter.offset.max(0))
            .fetch_all(pool)
            .await
        }
    })
    .await?;

    rows.iter().map(session_from_row).collect()
}

/// Atomic `pending -> in_progress` claim with `pod_id` assignment (§4.6).
/// Returns the claimed session, or `None` if another pod won the race (or
/// no pending session exists).
pub async fn claim_pending_session(pool: &Pool, pod_id: &str, now_us: i64) -> Result<Option<Session>> {
    let row = with_retry(Retry::Transient, "repo.claim_pending_session", || {
        let pod_id = pod_id.to_string();
        async move {
            sqlx::query(
                "UPDATE alert_sessions SET status = 'in_progress', pod_id = $1, last_interaction_at_us = $2
                 WHERE session_id = (
                     SELECT session_id FROM alert_sessions
                     WHERE status = 'pending'
                     ORDER BY started_at_us ASC
                     LIMIT 1
                     FOR UPDATE SKIP LOCKED
                 )
                 RETURNING *",
            )
            .bind(&pod_id)
            .bind(now_us)
            .fetch_optional(pool)
            .await
        }
    })
    .await?;

    row.as_ref().map(session_from_row).transpose()
}

/// Sessions this pod still owns as `in_progress` (§4.6 graceful shutdown:
/// "the pod marks its own `in_progress` sessions failed").
pub async fn list_in_progress_sessions_for_pod(pool: &Pool, pod_id: &str) -> Result<Vec<Session>> {
    let rows = with_retry(Retry::Transient, "repo.list_in_progress_sessions_for_pod", || {
        let pod_id = pod_id.to_string();
        async move {
            sqlx::query("SELECT * FROM alert_sessions WHERE status = 'in_progress' AND pod_id = $1")
                .bind(&pod_id)
                .fetch_all(pool)
                .await
        }
    })
    .await?;

    rows.iter().map(session_from_row).collect()
}

/// Sessions stuck `in_progress` with a stale heartbeat, regardless of which
/// pod claims them (§4.6 startup orphan sweep).
pub async fn list_orphaned_sessions(pool: &Pool, cutoff_us: i64) -> Result<Vec<Session>> {
    let rows = with_retry(Retry::Transient, "repo.list_orphaned_sessions", || async move {
        sqlx::query("SELECT * FROM alert_sessions WHERE status = 'in_progress' AND last_interaction_at_us < $1")
            .bind(cutoff_us)
            .fetch_all(pool)
            .await
    })
    .await?;

    rows.iter().map(session_from_row).collect()
}

pub async fn update_session_status(
    pool: &Pool,
    session_id: Uuid,
    status: SessionStatus,
    error: Option<&str>,
    completed_at_us: Option<i64>,
) -> Result<()> {
    let status_text = enum_to_text(&status);
    with_retry(Retry::Transient, "repo.update_session_status", || {
        let status_text = status_text.clone();
        let error = error.map(str::to_string);
        async move {
            sqlx::query(
                "UPDATE alert_sessions SET status = $1, error = $2, completed_at_us = $3 WHERE session_id = $4",
            )
            .bind(&status_text)
            .bind(&error)
            .bind(completed_at_us)
            .bind(session_id)
            .execute(pool)
            .await
        }
    })
    .await
    .map(|_| ())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stage executions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn create_stage_execution(pool: &Pool, stage: &StageExecution) -> Result<()> {
    let status = enum_to_text(&stage.status);
    let strategy = enum_to_text(&stage.iteration_strategy);
    let parallel_type = enum_to_text(&stage.parallel_type);

    with_retry(Retry::Transient, "repo.create_stage_execution", || {
        let status = status.clone();
        let strategy = strategy.clone();
        let parallel_type = parallel_type.clone();
        async move {
            sqlx::query(
                "INSERT INTO stage_executions (
                    execution_id, session_id, stage_index, stage_name, agent,
                    iteration_strategy, status, started_at_us, completed_at_us,
                    duration_ms, parent_stage_execution_id, parallel_index,
                    parallel_type, stage_output, error
                ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)",
            )
            .bind(stage.execution_id)
            .bind(stage.session_id)
            .bind(stage.stage_index as i32)
            .bind(&stage.stage_name)
            .bind(&stage.agent)
            .bind(&strategy)
            .bind(&status)
            .bind(stage.started_at_us)
            .bind(stage.completed_at_us)
            .bind(stage.duration_ms)
            .bind(stage.parent_stage_execution_id)
            .bind(stage.parallel_index as i32)
            .bind(&parallel_type)
            .bind(&stage.stage_output)
            .bind(&stage.error)
            .execute(pool)
            .await
        }
    })
    .await
    .map(|_| ())
}

fn stage_from_row(row: &sqlx::postgres::PgRow) -> Result<StageExecution> {
    let status: String = row.try_get("status").map_err(row_err)?;
    let strategy: String = row.try_get("iteration_strategy").map_err(row_err)?;
    let parallel_type: String = row.try_get("parallel_type").map_err(row_err)?;
    let stage_index: i32 = row.try_get("stage_index").map_err(row_err)?;
    let parallel_index: i32 = row.try_get("parallel_index").map_err(row_err)?;

    Ok(StageExecution {
        execution_id: row.try_get("execution_id").map_err(row_err)?,
        session_id: row.try_get("session_id").map_err(row_err)?,
        stage_index: stage_index as u32,
        stage_name: row.try_get("stage_name").map_err(row_err)?,
        agent: row.try_get("agent").map_err(row_err)?,
        iteration_strategy: text_to_enum::<IterationStrategy>(&strategy)?,
        status: text_to_enum::<StageStatus>(&status)?,
        started_at_us: row.try_get("started_at_us").map_err(row_err)?,
        completed_at_us: row.try_get("completed_at_us").map_err(row_err)?,
        duration_ms: row.try_get("duration_ms").map_err(row_err)?,
        parent_stage_execution_id: row.try_get("parent_stage_execution_id").map_err(row_err)?,
        parallel_index: parallel_index as u32,
        parallel_type: text_to_enum::<ParallelType>(&parallel_type)?,
        stage_output: row.try_get("stage_output").map_err(row_err)?,
        error: row.try_get("error").map_err(row_err)?,
    })
}

pub async fn get_stage_execution(pool: &Pool, execution_id: Uuid) -> Result<Option<StageExecution>> {
    with_retry(Retry::Transient, "repo.get_stage_execution", || async move {
        sqlx::query("SELECT * FROM stage_executions WHERE execution_id = $1")
            .bind(execution_id)
            .fetch_optional(pool)
            .await
    })
    .await?
    .as_ref()
    .map(stage_from_row)
    .transpose()
}

pub async fn list_stage_executions(pool: &Pool, session_id: Uuid) -> Result<Vec<StageExecution>> {
    let rows = with_retry(Retry::Transient, "repo.list_stage_executions", || async move {
        sqlx::query("SELECT * FROM stage_executions WHERE session_id = $1 ORDER BY stage_index ASC, parallel_index ASC")
            .bind(session_id)
            .fetch_all(pool)
            .await
    })
    .await?;

    rows.iter().map(stage_from_row).collect()
}

pub async fn list_child_stage_executions(pool: &Pool, parent_stage_execution_id: Uuid) -> Result<Vec<StageExecution>> {
    let rows = with_retry(Retry::Transient, "repo.list_child_stage_executions", || async move {
        sqlx::query("SELECT * FROM stage_executions WHERE parent_stage_execution_id = $1 ORDER BY parallel_index ASC")
            .bind(parent_stage_execution_id)
            .fetch_all(pool)
            .await
    })
    .await?;

    rows.iter().map(stage_from_row).collect()
}

/// One shared update path for every stage-executor terminal transition
/// (§4.4 steps 5-7): status, optional output/error, completion timestamp
/// and measured duration all move together.
#[derive(Debug, Clone, Default)]
pub struct StageUpdate {
    pub status: Option<StageStatus>,
    pub stage_output: Option<Value>,
    pub error: Option<String>,
    pub started_at_us: Option<i64>,
    pub completed_at_us: Option<i64>,
    pub duration_ms: Option<i64>,
}

pub async fn update_stage_execution(pool: &Pool, execution_id: Uuid, update: &StageUpdate) -> Result<()> {
    let status_text = update.status.map(|s| enum_to_text(&s));
    with_retry(Retry::Transient, "repo.update_stage_execution", || {
        let status_text = status_text.clone();
        let update = update.clone();
        async move {
            sqlx::query(
                "UPDATE stage_executions SET
                    status = COALESCE($1, status),
                    stage_output = COALESCE($2, stage_output),
                    error = COALESCE($3, error),
                    started_at_us = COALESCE($4, started_at_us),
                    completed_at_us = COALESCE($5, completed_at_us),
                    duration_ms = COALESCE($6, duration_ms)
                 WHERE execution_id = $7",
            )
            .bind(status_text)
            .bind(update.stage_output)
            .bind(update.error)
            .bind(update.started_at_us)
            .bind(update.completed_at_us)
            .bind(update.duration_ms)
            .bind(execution_id)
            .execute(pool)
            .await
        }
    })
    .await
    .map(|_| ())
}

/// Interactions logged anywhere in `session_id`, oldest first — backs the
/// "incl. stages and interactions" session detail view (§6).
pub async fn list_llm_interactions(pool: &Pool, session_id: Uuid) -> Result<Vec<LlmInteraction>> {
    let rows = with_retry(Retry::Transient, "repo.list_llm_interactions", || async move {
        sqlx::query("SELECT * FROM llm_interactions WHERE session_id = $1 ORDER BY timestamp_us ASC")
            .bind(session_id)
            .fetch_all(pool)
            .await
    })
    .await?;

    rows.iter()
        .map(|r| {
            Ok(LlmInteraction {
                interaction_id: r.try_get("interaction_id").map_err(row_err)?,
                session_id: r.try_get("session_id").map_err(row_err)?,
                stage_execution_id: r.try_get("stage_execution_id").map_err(row_err)?,
                mcp_event_id: r.try_get("mcp_event_id").map_err(row_err)?,
                model_name: r.try_get("model_name").map_err(row_err)?,
                request_json: r.try_get("request_json").map_err(row_err)?,
                response_json: r.try_get("response_json").map_err(row_err)?,
                token_usage: r.try_get("token_usage").map_err(row_err)?,
                tool_calls: r.try_get("tool_calls").map_err(row_err)?,
                tool_results: r.try_get("tool_results").map_err(row_err)?,
                duration_ms: r.try_get("duration_ms").map_err(row_err)?,
                success: r.try_get("success").map_err(row_err)?,
                error: r.try_get("error").map_err(row_err)?,
                timestamp_us: r.try_get("timestamp_us").map_err(row_err)?,
            })
        })
        .collect()
}

pub async fn list_mcp_interactions(pool: &Pool, session_id: Uuid) -> Result<Vec<McpInteraction>> {
    let rows = with_retry(Retry::Transient, "repo.list_mcp_interactions", || async move {
        sqlx::query("SELECT * FROM mcp_interactions WHERE session_id = $1 ORDER BY timestamp_us ASC")
            .bind(session_id)
            .fetch_all(pool)
            .await
    })
    .await?;

    rows.iter()
        .map(|r| {
            let communication_type: String = r.try_get("communication_type").map_err(row_err)?;
            Ok(McpInteraction {
                interaction_id: r.try_get("interaction_id").map_err(row_err)?,
                session_id: r.try_get("session_id").map_err(row_err)?,
                stage_execution_id: r.try_get("stage_execution_id").map_err(row_err)?,
                server_name: r.try_get("server_name").map_err(row_err)?,
                communication_type: text_to_enum::<McpCommunicationType>(&communication_type)?,
                tool_name: r.try_get("tool_name").map_err(row_err)?,
                tool_arguments: r.try_get("tool_arguments").map_err(row_err)?,
                tool_result: r.try_get("tool_result").map_err(row_err)?,
                available_tools: r.try_get("available_tools").map_err(row_err)?,
                duration_ms: r.try_get("duration_ms").map_err(row_err)?,
                success: r.try_get("success").map_err(row_err)?,
                error: r.try_get("error").map_err(row_err)?,
                timestamp_us: r.try_get("timestamp_us").map_err(row_err)?,
            })
        })
        .collect()
}

/// Sets every non-terminal stage execution belonging to `session_id` to
/// `failed` with `error` (§4.6 orphan sweep and graceful-shutdown sweep
/// share this shape, differing only in the message).
pub async fn fail_non_terminal_stages(pool: &Pool, session_id: Uuid, error: &str) -> Result<u64> {
    let error = error.to_string();
    let result = with_retry(Retry::Transient, "repo.fail_non_terminal_stages", || {
        let error = error.clone();
        async move {
            sqlx::query(
                "UPDATE stage_executions SET status = 'failed', error = $1, completed_at_us = (extract(epoch from now()) * 1000000)::bigint
                 WHERE session_id = $2 AND status NOT IN ('completed', 'failed', 'cancelled')",
            )
            .bind(&error)
            .bind(session_id)
            .execute(pool)
            .await
        }
    })
    .await?;

    Ok(result.rows_affected())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chats
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn create_chat(pool: &Pool, chat: &Chat) -> Result<()> {
    with_retry(Retry::Transient, "repo.create_chat", || async move {
        sqlx::query("INSERT INTO chats (chat_id, session_id, created_at_us) VALUES ($1,$2,$3)")
            .bind(chat.chat_id)
            .bind(chat.session_id)
            .bind(chat.created_at_us)
            .execute(pool)
            .await
    })
    .await
    .map(|_| ())
}

pub async fn get_chat_by_session(pool: &Pool, session_id: Uuid) -> Result<Option<Chat>> {
    let row = with_retry(Retry::Transient, "repo.get_chat_by_session", || async move {
        sqlx::query("SELECT * FROM chats WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(pool)
            .await
    })
    .await?;

    row.map(|r| {
        Ok(Chat {
            chat_id: r.try_get("chat_id").map_err(row_err)?,
            session_id: r.try_get("session_id").map_err(row_err)?,
            created_at_us: r.try_get("created_at_us").map_err(row_err)?,
        })
    })
    .transpose()
}

pub async fn get_chat(pool: &Pool, chat_id: Uuid) -> Result<Option<Chat>> {
    let row = with_retry(Retry::Transient, "repo.get_chat", || async move {
        sqlx::query("SELECT * FROM chats WHERE chat_id = $1")
            .bind(chat_id)
            .fetch_optional(pool)
            .await
    })
    .await?;

    row.map(|r| {
        Ok(Chat {
            chat_id: r.try_get("chat_id").map_err(row_err)?,
            session_id: r.try_get("session_id").map_err(row_err)?,
            created_at_us: r.try_get("created_at_us").map_err(row_err)?,
        })
    })
    .transpose()
}

pub async fn add_chat_message(pool: &Pool, message: &ChatUserMessage) -> Result<()> {
    let role = enum_to_text(&message.role);
    with_retry(Retry::Transient, "repo.add_chat_message", || {
        let role = role.clone();
        async move {
            sqlx::query(
                "INSERT INTO chat_user_messages (message_id, chat_id, role, content, created_at_us)
                 VALUES ($1,$2,$3,$4,$5)",
            )
            .bind(message.message_id)
            .bind(message.chat_id)
            .bind(&role)
            .bind(&message.content)
            .bind(message.created_at_us)
            .execute(pool)
            .await
        }
    })
    .await
    .map(|_| ())
}

pub async fn list_chat_messages(pool: &Pool, chat_id: Uuid) -> Result<Vec<ChatUserMessage>> {
    let rows = with_retry(Retry::Transient, "repo.list_chat_messages", || async move {
        sqlx::query("SELECT * FROM chat_user_messages WHERE chat_id = $1 ORDER BY created_at_us ASC")
            .bind(chat_id)
            .fetch_all(pool)
            .await
    })
    .await?;

    rows.iter()
        .map(|r| {
            let role: String = r.try_get("role").map_err(row_err)?;
            Ok(ChatUserMessage {
                message_id: r.try_get("message_id").map_err(row_err)?,
                chat_id: r.try_get("chat_id").map_err(row_err)?,
                role: text_to_enum::<ChatMessageRole>(&role)?,
                content: r.try_get("content").map_err(row_err)?,
                created_at_us: r.try_get("created_at_us").map_err(row_err)?,
            })
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session scores
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The partial unique index on `(session_id) WHERE status IN (pending,
/// in_progress)` (§6) makes a second concurrent scoring attempt a unique
/// violation rather than a race this function needs to detect itself.
pub async fn create_session_score(pool: &Pool, score: &SessionScore) -> Result<()> {
    let status = enum_to_text(&score.status);
    sqlx::query(
        "INSERT INTO session_scores (
            score_id, session_id, status, overall_score, rationale,
            prompt_hash, created_at_us, completed_at_us
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)",
    )
    .bind(score.score_id)
    .bind(score.session_id)
    .bind(&status)
    .bind(score.overall_score)
    .bind(&score.rationale)
    .bind(&score.prompt_hash)
    .bind(score.created_at_us)
    .bind(score.completed_at_us)
    .execute(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Error::Other("a score is already pending or in progress for this session".to_string())
        }
        _ => row_err(e),
    })?;
    Ok(())
}

fn score_from_row(row: &sqlx::postgres::PgRow) -> Result<SessionScore> {
    let status: String = row.try_get("status").map_err(row_err)?;
    Ok(SessionScore {
        score_id: row.try_get("score_id").map_err(row_err)?,
        session_id: row.try_get("session_id").map_err(row_err)?,
        status: text_to_enum::<ScoreStatus>(&status)?,
        overall_score: row.try_get("overall_score").map_err(row_err)?,
        rationale: row.try_get("rationale").map_err(row_err)?,
        prompt_hash: row.try_get("prompt_hash").map_err(row_err)?,
        created_at_us: row.try_get("created_at_us").map_err(row_err)?,
        completed_at_us: row.try_get("completed_at_us").map_err(row_err)?,
    })
}

pub async fn list_session_scores(pool: &Pool, session_id: Uuid) -> Result<Vec<SessionScore>> {
    let rows = with_retry(Retry::Transient, "repo.list_session_scores", || async move {
        sqlx::query("SELECT * FROM session_scores WHERE session_id = $1 ORDER BY created_at_us DESC")
            .bind(session_id)
            .fetch_all(pool)
            .await
    })
    .await?;

    rows.iter().map(score_from_row).collect()
}

pub async fn update_session_score(
    pool: &Pool,
    score_id: Uuid,
    status: ScoreStatus,
    overall_score: Option<f64>,
    rationale: Option<&str>,
    completed_at_us: Option<i64>,
) -> Result<()> {
    let status_text = enum_to_text(&status);
    with_retry(Retry::Transient, "repo.update_session_score", || {
        let status_text = status_text.clone();
        let rationale = rationale.map(str::to_string);
        async move {
            sqlx::query(
                "UPDATE session_scores SET status = $1, overall_score = $2, rationale = $3, completed_at_us = $4
                 WHERE score_id = $5",
            )
            .bind(&status_text)
            .bind(overall_score)
            .bind(&rationale)
            .bind(completed_at_us)
            .bind(score_id)
            .execute(pool)
            .await
        }
    })
    .await
    .map(|_| ())
}
