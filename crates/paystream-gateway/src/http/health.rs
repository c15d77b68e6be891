use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness probe with build info and live feed counters.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "git_sha": env!("PAYSTREAM_GIT_SHA"),
        "broadcast": {
            "state": state.hub.state(),
            "metrics": state.hub.metrics(),
        },
    }))
}
