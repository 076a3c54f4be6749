use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::app::services::AppServices;

/// Liveness: the store and cache answer a ping.
pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let checks = [
        ("store", services.check_store().await),
        ("cache", services.check_cache().await),
    ];
    report(checks, ("healthy", "unhealthy"), "Service health check")
}

/// Readiness: liveness plus the event log.
pub async fn ready(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let checks = [
        ("store", services.check_store().await),
        ("cache", services.check_cache().await),
        ("log", services.check_log().await),
    ];
    report(checks, ("ready", "not_ready"), "Service readiness check")
}

fn report<const N: usize>(
    checks: [(&'static str, Result<(), String>); N],
    (up, down): (&'static str, &'static str),
    message: &'static str,
) -> axum::response::Response {
    let mut all_ok = true;
    let mut details = Map::new();
    for (name, result) in checks {
        let status = match result {
            Ok(()) => "ok".to_owned(),
            Err(err) => {
                warn!(dependency = name, error = %err, "dependency check failed");
                all_ok = false;
                format!("error: {err}")
            }
        };
        details.insert(name.to_owned(), Value::String(status));
    }

    let (code, status) = if all_ok {
        (StatusCode::OK, up)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, down)
    };
    (
        code,
        Json(json!({
            "status": status,
            "message": message,
            "checks": details,
        })),
    )
        .into_response()
}
