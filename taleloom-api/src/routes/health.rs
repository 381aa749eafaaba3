//! Liveness probe.

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
