use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

pub fn health_router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz))
}

/// Liveness probe, no auth required.
async fn healthz(State(state): State<AppState>) -> Json<Value> {
    let running = state.controller.running_accounts().await.len();
    Json(json!({
        "status": "ok",
        "mode": state.trading_mode.to_string(),
        "running_bots": running,
    }))
}
