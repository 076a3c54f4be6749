use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::debug;

use shelfline_core::{ProductId, RequestContext};
use shelfline_products::ProductInput;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route(
            "/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    body: Result<Json<ProductInput>, JsonRejection>,
) -> axum::response::Response {
    let Json(input) = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!(error = %rejection, "rejected create body");
            return errors::invalid_request();
        }
    };

    match services.products.create(&ctx, &input).await {
        Ok(accepted) => (
            StatusCode::ACCEPTED,
            Json(dto::AcceptedResponse::new(accepted, "Product creation accepted")),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e, "Failed to create product"),
    }
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(raw_id): Path<String>,
) -> axum::response::Response {
    let Ok(id) = raw_id.parse::<ProductId>() else {
        return errors::invalid_id();
    };

    match services.products.get(&ctx, id).await {
        Ok(product) => (StatusCode::OK, Json(product)).into_response(),
        Err(e) => errors::service_error_to_response(e, "Failed to get product"),
    }
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(raw_id): Path<String>,
    body: Result<Json<ProductInput>, JsonRejection>,
) -> axum::response::Response {
    let Ok(id) = raw_id.parse::<ProductId>() else {
        return errors::invalid_id();
    };
    let Json(input) = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!(error = %rejection, "rejected update body");
            return errors::invalid_request();
        }
    };

    match services.products.update(&ctx, id, &input).await {
        Ok(accepted) => (
            StatusCode::ACCEPTED,
            Json(dto::AcceptedResponse::new(accepted, "Product update accepted")),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e, "Failed to update product"),
    }
}

pub async fn delete_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(raw_id): Path<String>,
) -> axum::response::Response {
    let Ok(id) = raw_id.parse::<ProductId>() else {
        return errors::invalid_id();
    };

    match services.products.delete(&ctx, id).await {
        Ok(accepted) => (
            StatusCode::ACCEPTED,
            Json(dto::AcceptedResponse::new(accepted, "Product deletion accepted")),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e, "Failed to delete product"),
    }
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Query(params): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    let query = dto::list_query(&params);
    if query.matches_nothing {
        return (
            StatusCode::OK,
            Json(dto::ListProductsResponse::new(Vec::new(), &query.filter)),
        )
            .into_response();
    }

    match services.products.list(&ctx, &query.filter).await {
        Ok(products) => (
            StatusCode::OK,
            Json(dto::ListProductsResponse::new(products, &query.filter)),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e, "Failed to list products"),
    }
}
