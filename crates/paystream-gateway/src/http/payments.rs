//! Payment CRUD: /api/payments.
//!
//! Successful creates and updates are published to the live feed after the
//! row is written; a dropped event never fails the request.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Json,
};
use paystream_payments::{InputPayment, PaymentEvent};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::{bad_body, bad_id, respond, store_error, ApiResult};
use crate::app::AppState;

/// POST /api/payments
pub async fn create_payment(
    State(state): State<Arc<AppState>>,
    body: Result<Json<InputPayment>, JsonRejection>,
) -> ApiResult {
    let Json(input) = body.map_err(bad_body)?;
    let payment = state.store.create_payment(&input).map_err(store_error)?;
    info!(payment_id = payment.id, product_id = payment.product_id, "payment created");

    state.publish(PaymentEvent::created(payment.clone()));
    Ok(respond(StatusCode::CREATED, "New payment created", payment))
}

/// GET /api/payments
pub async fn list_payments(State(state): State<Arc<AppState>>) -> ApiResult {
    let payments = state.store.list_payments().map_err(store_error)?;
    Ok(respond(StatusCode::OK, "", payments))
}

/// GET /api/payments/{id}
pub async fn get_payment(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult {
    let Path(id) = id.map_err(bad_id)?;
    let payment = state.store.get_payment(id).map_err(store_error)?;
    Ok(respond(StatusCode::OK, "", payment))
}

/// PUT /api/payments/{id}
pub async fn update_payment(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<InputPayment>, JsonRejection>,
) -> ApiResult {
    let Path(id) = id.map_err(bad_id)?;
    let Json(input) = body.map_err(bad_body)?;
    let payment = state.store.update_payment(id, &input).map_err(store_error)?;
    info!(payment_id = id, product_id = payment.product_id, "payment updated");

    state.publish(PaymentEvent::updated(payment.clone()));
    Ok(respond(StatusCode::OK, "Payment updated", payment))
}

/// DELETE /api/payments/{id}
pub async fn delete_payment(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult {
    let Path(id) = id.map_err(bad_id)?;
    state.store.delete_payment(id).map_err(store_error)?;
    info!(payment_id = id, "payment deleted");
    Ok(respond(StatusCode::OK, "Payment successfully deleted", Value::Null))
}
