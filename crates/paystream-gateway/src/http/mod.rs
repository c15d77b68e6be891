//! HTTP handlers and the shared `{ success, message, data }` response envelope.

pub mod health;
pub mod payments;
pub mod products;
pub mod stream;

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    Json,
};
use paystream_payments::StoreError;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, warn};

pub type ApiResponse = (StatusCode, Json<Value>);
pub type ApiResult = Result<ApiResponse, ApiResponse>;

/// Successful envelope carrying `data`.
pub fn respond<T: Serialize>(status: StatusCode, message: &str, data: T) -> ApiResponse {
    (
        status,
        Json(json!({
            "success": true,
            "message": message,
            "data": data,
        })),
    )
}

/// Failed envelope; `detail` goes into `data` the way clients already expect.
pub fn failure(status: StatusCode, message: &str, detail: impl Into<String>) -> ApiResponse {
    (
        status,
        Json(json!({
            "success": false,
            "message": message,
            "data": detail.into(),
        })),
    )
}

/// Map a store error to its HTTP status. Internal details are logged, not returned.
pub fn store_error(e: StoreError) -> ApiResponse {
    match &e {
        StoreError::NotFound { entity, .. } => {
            let message = if *entity == "product" {
                "Product not found"
            } else {
                "Payment not found"
            };
            failure(StatusCode::NOT_FOUND, message, e.to_string())
        }
        StoreError::ProductNotFound { .. } => {
            failure(StatusCode::NOT_FOUND, "Product not found", e.to_string())
        }
        StoreError::ProductInUse { .. } => {
            failure(StatusCode::CONFLICT, "Product still has payments", e.to_string())
        }
        StoreError::InvalidInput(_) => {
            failure(StatusCode::BAD_REQUEST, "Invalid input", e.to_string())
        }
        StoreError::Database(_) | StoreError::Poisoned => {
            error!(error = %e, "store operation failed");
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Something went wrong",
                "internal error",
            )
        }
    }
}

pub fn bad_body(rejection: JsonRejection) -> ApiResponse {
    warn!(error = %rejection, "rejected request body");
    failure(
        StatusCode::BAD_REQUEST,
        "Cannot extract JSON body",
        rejection.body_text(),
    )
}

pub fn bad_id(rejection: PathRejection) -> ApiResponse {
    failure(
        StatusCode::BAD_REQUEST,
        "Wrong id parameter",
        rejection.body_text(),
    )
}
