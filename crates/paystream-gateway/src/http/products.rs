//! Product CRUD: /api/products.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Json,
};
use paystream_payments::InputProduct;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::{bad_body, bad_id, respond, store_error, ApiResult};
use crate::app::AppState;

/// POST /api/products
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    body: Result<Json<InputProduct>, JsonRejection>,
) -> ApiResult {
    let Json(input) = body.map_err(bad_body)?;
    let product = state.store.create_product(&input).map_err(store_error)?;
    info!(product_id = product.id, "product created");
    Ok(respond(StatusCode::CREATED, "New product created", product))
}

/// GET /api/products
pub async fn list_products(State(state): State<Arc<AppState>>) -> ApiResult {
    let products = state.store.list_products().map_err(store_error)?;
    Ok(respond(StatusCode::OK, "", products))
}

/// GET /api/products/{id}
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult {
    let Path(id) = id.map_err(bad_id)?;
    let product = state.store.get_product(id).map_err(store_error)?;
    Ok(respond(StatusCode::OK, "", product))
}

/// PUT /api/products/{id}
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<InputProduct>, JsonRejection>,
) -> ApiResult {
    let Path(id) = id.map_err(bad_id)?;
    let Json(input) = body.map_err(bad_body)?;
    let product = state.store.update_product(id, &input).map_err(store_error)?;
    info!(product_id = id, "product updated");
    Ok(respond(StatusCode::OK, "Product updated", product))
}

/// DELETE /api/products/{id}
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult {
    let Path(id) = id.map_err(bad_id)?;
    state.store.delete_product(id).map_err(store_error)?;
    info!(product_id = id, "product deleted");
    Ok(respond(StatusCode::OK, "Product deleted", Value::Null))
}
