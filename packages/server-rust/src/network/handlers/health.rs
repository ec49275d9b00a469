//! Health, liveness and readiness probes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;

/// Detailed health JSON. Always 200; the `state` field carries readiness.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "state": state.shutdown.health_state().as_str(),
        "family": state.runner.family_name(),
        "running_batches": state.shutdown.running_batches(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness probe: 200 while the process answers at all.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 200 only in `Ready`, 503 while starting or draining.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state().accepts_batches() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
