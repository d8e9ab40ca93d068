//! `POST /alerts` (§6): create a session from an incoming alert. The
//! claimer picks it up asynchronously; this handler only persists it.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use tarsy_domain::session::Session;
use tarsy_engine::clock::now_us;
use tarsy_engine::repo;

use crate::api::error::error_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateAlertBody {
    pub alert_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

pub async fn create_alert(
    State(state): State<AppState>,
    Json(body): Json<CreateAlertBody>,
) -> impl IntoResponse {
    let session_id = Uuid::new_v4();
    let session = Session::new(session_id, body.alert_type, body.data, now_us());

    match repo::create_session(&state.pool, &session).await {
        Ok(()) => (
            axum::http::StatusCode::CREATED,
            Json(serde_json::json!({
                "session_id": session.session_id,
                "status": session.status,
                "message": "alert accepted",
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}
