//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: collaborator wiring (store, cache, log, producer, usecases)
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{error_handling::HandleErrorLayer, routing::get, Extension, Router};
use tower::ServiceBuilder;
use tower::timeout::TimeoutLayer;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::RequestBodyTimeoutLayer;

use shelfline_infra::config::ServerConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(services: Arc<AppServices>, server: &ServerConfig) -> Router {
    let limiter = middleware::RateLimitState::per_second(server.rate_limit);

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/health/ready", get(routes::system::ready))
        .nest("/api/v1", routes::router())
        .layer(Extension(services))
        .layer(RequestBodyTimeoutLayer::new(server.read_timeout))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(middleware::handle_timeout_error))
                .layer(TimeoutLayer::new(server.write_timeout)),
        )
        .layer(axum::middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit,
        ))
        .layer(CatchPanicLayer::custom(middleware::panic_response))
        .layer(axum::middleware::from_fn(middleware::log_request))
        .layer(axum::middleware::from_fn(middleware::request_id))
}
