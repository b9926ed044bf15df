//! Liveness endpoint, unthrottled and unauthenticated.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};
use termgate_core::db::unix_now;

use super::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime": state.started_at.elapsed().as_secs(),
        "timestamp": unix_now(),
    }))
}
