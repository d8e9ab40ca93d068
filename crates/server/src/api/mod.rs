pub mod alerts;
pub mod auth;
pub mod chat;
pub mod error;
pub mod scores;
pub mod sessions;
pub mod sse;
pub mod system;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router (§12).
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind the bearer-token middleware in [`auth::require_api_token`]).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/health", get(system::health));

    let protected = Router::new()
        .route("/alerts", post(alerts::create_alert))
        .route("/sessions", get(sessions::list_sessions))
        .route("/sessions/:id", get(sessions::get_session))
        .route(
            "/sessions/:id/stages/:stage_id/cancel",
            post(sessions::cancel_stage),
        )
        .route("/chats", post(chat::create_chat))
        .route("/chats/:id/messages", post(chat::post_message))
        .route("/chats/:id/messages", get(chat::list_messages))
        .route("/sessions/:id/scores", post(scores::create_score))
        .route("/sessions/:id/scores", get(scores::list_scores))
        .route("/events/stream", get(sse::stream_events))
        .route("/system/warnings", get(system::list_warnings))
        .route("/system/mcp-servers", get(system::list_mcp_servers))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
