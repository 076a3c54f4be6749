use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use shelfline_core::ErrorKind;
use shelfline_infra::ServiceError;

/// Maps a usecase failure onto a response by its [`ErrorKind`].
///
/// `failure_message` is what the client sees for server-side failures; the
/// underlying error is only logged.
pub fn service_error_to_response(
    err: ServiceError,
    failure_message: &'static str,
) -> axum::response::Response {
    let kind = err.kind();
    match kind {
        ErrorKind::Validation => json_error(StatusCode::BAD_REQUEST, kind.as_str(), err.to_string()),
        ErrorKind::NotFound => json_error(StatusCode::NOT_FOUND, kind.as_str(), "Product not found"),
        ErrorKind::Transport | ErrorKind::Internal | ErrorKind::Apply | ErrorKind::Decode => {
            error!(error = %err, kind = kind.as_str(), "request failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, kind.as_str(), failure_message)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn invalid_id() -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", "Invalid product ID")
}

pub fn invalid_request() -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_request", "Invalid JSON format")
}
