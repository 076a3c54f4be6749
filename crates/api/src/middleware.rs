use std::any::Any;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use tracing::{error, info, warn};

use shelfline_core::RequestContext;

use crate::app::errors;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Attaches a [`RequestContext`] to the request and echoes its id back.
///
/// A client-supplied `x-request-id` is reused; otherwise a UUIDv7 is generated.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let ctx = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map(RequestContext::new)
        .unwrap_or_else(RequestContext::generate);

    req.extensions_mut().insert(ctx.clone());
    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(ctx.request_id()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

pub async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let request_id = req
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id().to_owned())
        .unwrap_or_default();
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    if response.status().is_server_error() {
        warn!(%method, path, status, duration_ms, request_id, "request failed");
    } else {
        info!(%method, path, status, duration_ms, request_id, "request completed");
    }
    response
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Process-wide token bucket shared by every route.
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<DirectRateLimiter>,
}

impl RateLimitState {
    /// Bucket refilling `requests` tokens per second, with a burst of the same size.
    pub fn per_second(requests: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

pub async fn rate_limit(State(state): State<RateLimitState>, req: Request, next: Next) -> Response {
    match state.limiter.check() {
        Ok(()) => next.run(req).await,
        Err(_) => {
            warn!(path = req.uri().path(), "rate limit exceeded");
            errors::json_error(
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_exceeded",
                "Too many requests",
            )
        }
    }
}

/// Converts a handler panic into a 500 JSON response.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    error!(panic = detail, "handler panicked");

    errors::json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "Internal server error",
    )
}

pub async fn handle_timeout_error(err: tower::BoxError) -> Response {
    if err.is::<tower::timeout::error::Elapsed>() {
        warn!("request timed out");
        errors::json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "request_timeout",
            "Request timed out",
        )
    } else {
        error!(error = %err, "unhandled middleware error");
        errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Internal server error",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::Request as HttpRequest,
        routing::get,
        Extension, Router,
    };
    use tower::ServiceExt;
    use tower_http::catch_panic::CatchPanicLayer;

    async fn echo_request_id(Extension(ctx): Extension<RequestContext>) -> String {
        ctx.request_id().to_owned()
    }

    async fn boom() -> &'static str {
        panic!("boom")
    }

    fn request(uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn client_request_id_is_propagated_and_echoed() {
        let app = Router::new()
            .route("/", get(echo_request_id))
            .layer(axum::middleware::from_fn(request_id));

        let req = HttpRequest::builder()
            .uri("/")
            .header(REQUEST_ID_HEADER, "req-42")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-42");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"req-42");
    }

    #[tokio::test]
    async fn missing_request_id_is_generated() {
        let app = Router::new()
            .route("/", get(echo_request_id))
            .layer(axum::middleware::from_fn(request_id));

        let response = app.oneshot(request("/")).await.unwrap();

        let generated = response.headers()[REQUEST_ID_HEADER].to_str().unwrap();
        assert!(uuid::Uuid::parse_str(generated).is_ok());
    }

    #[tokio::test]
    async fn requests_over_the_quota_get_429() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                RateLimitState::per_second(1),
                rate_limit,
            ));

        let first = app.clone().oneshot(request("/")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(request("/")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(second).await["error"], "rate_limit_exceeded");
    }

    #[tokio::test]
    async fn panics_become_internal_errors() {
        let app = Router::new()
            .route("/", get(boom))
            .layer(CatchPanicLayer::custom(panic_response));

        let response = app.oneshot(request("/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], "internal_error");
    }
}
