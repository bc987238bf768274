use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness check, returns server metadata.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "os": state.os.as_str(),
        "scheduler_running": state.engine.is_running(),
        "active_triggers": state.engine.active_jobs().len(),
        "reconcile_interval_secs": state.config.scheduler.reconcile_interval_secs,
    }))
}
