//! Maps `tarsy_domain::error::Error` onto HTTP status codes.
//!
//! The domain crate stays axum-free (§10.2), so the `Error -> IntoResponse`
//! convention lives here instead of as a blanket impl on the error type
//! itself, following the gateway's per-handler status-code mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use tarsy_domain::error::Error;

pub fn error_response(err: &Error) -> Response {
    let status = match err {
        Error::Auth(_) => StatusCode::UNAUTHORIZED,
        Error::Config(_) | Error::Configuration(_) => StatusCode::BAD_REQUEST,
        Error::ToolSelection(_) | Error::ToolExecution(_) | Error::IterationLimit(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        Error::Timeout(_) | Error::SessionTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        Error::ClaimLost(_) => StatusCode::CONFLICT,
        Error::Other(message) if message.contains("already pending or in progress") => {
            StatusCode::CONFLICT
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

pub fn not_found(message: impl Into<String>) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}
