//! Follow-up chat over a recorded session (§6 `POST /chats`, `POST
//! /chats/{id}/messages`).
//!
//! A session has at most one chat (§3); the chat's context is the
//! session's prior stage outputs, resolved fresh on every message rather
//! than snapshotted at creation time, so a rescored or re-reviewed session
//! does not leave the chat talking about stale context.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use tarsy_domain::chat::{Chat, ChatMessageRole, ChatUserMessage};
use tarsy_domain::tool::{Message, MessageContent, Role};
use tarsy_engine::clock::now_us;
use tarsy_engine::interactions::InteractionLog;
use tarsy_engine::repo;
use tarsy_providers::traits::GenerateOptions;

use crate::api::error::{error_response, not_found};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateChatBody {
    pub session_id: Uuid,
}

/// `POST /chats`: idempotent — a session that already has a chat gets it
/// back rather than a duplicate (§3: "a session may have at most one
/// chat").
pub async fn create_chat(
    State(state): State<AppState>,
    Json(body): Json<CreateChatBody>,
) -> impl IntoResponse {
    let session = match repo::get_session(&state.pool, body.session_id).await {
        Ok(Some(s)) => s,
        Ok(None) => return not_found("session not found"),
        Err(e) => return error_response(&e),
    };

    if let Some(existing) = match repo::get_chat_by_session(&state.pool, session.session_id).await
    {
        Ok(chat) => chat,
        Err(e) => return error_response(&e),
    } {
        return Json(serde_json::json!({ "chat": existing })).into_response();
    }

    let chat = Chat {
        chat_id: Uuid::new_v4(),
        session_id: session.session_id,
        created_at_us: now_us(),
    };

    match repo::create_chat(&state.pool, &chat).await {
        Ok(()) => (axum::http::StatusCode::CREATED, Json(serde_json::json!({ "chat": chat })))
            .into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct PostMessageBody {
    pub content: String,
}

/// `POST /chats/{id}/messages`: appends the user's message, then asks the
/// first configured LLM provider for a reply grounded in the session's
/// stage outputs, appends that too, and returns both.
pub async fn post_message(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Json(body): Json<PostMessageBody>,
) -> impl IntoResponse {
    let chat = match repo::get_chat(&state.pool, chat_id).await {
        Ok(Some(c)) => c,
        Ok(None) => return not_found("chat not found"),
        Err(e) => return error_response(&e),
    };

    let user_message = ChatUserMessage {
        message_id: Uuid::new_v4(),
        chat_id: chat.chat_id,
        role: ChatMessageRole::User,
        content: body.content,
        created_at_us: now_us(),
    };
    if let Err(e) = repo::add_chat_message(&state.pool, &user_message).await {
        return error_response(&e);
    }

    let reply = match generate_reply(&state, &chat, chat_id).await {
        Ok(reply) => reply,
        Err(e) => return error_response(&e),
    };

    let assistant_message = ChatUserMessage {
        message_id: Uuid::new_v4(),
        chat_id: chat.chat_id,
        role: ChatMessageRole::Assistant,
        content: reply,
        created_at_us: now_us(),
    };
    if let Err(e) = repo::add_chat_message(&state.pool, &assistant_message).await {
        return error_response(&e);
    }

    Json(serde_json::json!({
        "user_message": user_message,
        "assistant_message": assistant_message,
    }))
    .into_response()
}

/// `GET /chats/{id}/messages`: the full, insertion-ordered transcript.
pub async fn list_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
) -> impl IntoResponse {
    match repo::list_chat_messages(&state.pool, chat_id).await {
        Ok(messages) => Json(serde_json::json!({ "messages": messages })).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn generate_reply(
    state: &AppState,
    chat: &Chat,
    chat_id: Uuid,
) -> tarsy_domain::error::Result<String> {
    let stages = repo::list_stage_executions(&state.pool, chat.session_id).await?;
    let history = repo::list_chat_messages(&state.pool, chat_id).await?;

    let mut conversation = Vec::new();
    let mut context = String::from(
        "You are answering follow-up questions about a completed incident investigation. \
         Use the recorded stage outputs below as ground truth.\n\n",
    );
    for stage in &stages {
        if let Some(output) = &stage.stage_output {
            context.push_str(&format!("## {}\n{}\n\n", stage.stage_name, output));
        }
    }
    conversation.push(Message {
        role: Role::System,
        content: MessageContent::Text(context),
    });
    for message in &history {
        let role = match message.role {
            ChatMessageRole::User => Role::User,
            ChatMessageRole::Assistant => Role::Assistant,
        };
        conversation.push(Message {
            role,
            content: MessageContent::Text(message.content.clone()),
        });
    }

    let provider_id = state
        .providers
        .list_providers()
        .into_iter()
        .next()
        .ok_or_else(|| {
            tarsy_domain::error::Error::Config("no LLM provider configured for chat".to_string())
        })?;
    let provider = state.providers.get(&provider_id).ok_or_else(|| {
        tarsy_domain::error::Error::Config(format!("provider '{provider_id}' not found"))
    })?;

    let mut options = GenerateOptions::new(chat.session_id);
    options.provider = Some(provider_id);

    let started = std::time::Instant::now();
    let result = provider.generate(&conversation, options).await;
    let duration_ms = started.elapsed().as_millis() as i64;

    log_chat_interaction(&state.interactions, chat, &conversation, &result, duration_ms).await;

    result.map(|r| r.content)
}

async fn log_chat_interaction(
    interactions: &InteractionLog,
    chat: &Chat,
    conversation: &[Message],
    result: &tarsy_domain::error::Result<tarsy_providers::traits::GenerateResponse>,
    duration_ms: i64,
) {
    let (model_name, response_json, success, error) = match result {
        Ok(r) => (
            r.model.clone(),
            Some(serde_json::json!({ "content": r.content })),
            true,
            None,
        ),
        Err(e) => ("unknown".to_string(), None, false, Some(e.to_string())),
    };

    interactions
        .log_llm(tarsy_domain::interaction::LlmInteraction {
            interaction_id: Uuid::new_v4(),
            session_id: chat.session_id,
            stage_execution_id: None,
            mcp_event_id: None,
            model_name,
            request_json: serde_json::json!({ "conversation": conversation }),
            response_json,
            token_usage: None,
            tool_calls: None,
            tool_results: None,
            duration_ms,
            success,
            error,
            timestamp_us: now_us(),
        })
        .await;
}
