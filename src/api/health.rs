//! Liveness probe.

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

/// GET /api/health
pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/api/health", get(health))
}
