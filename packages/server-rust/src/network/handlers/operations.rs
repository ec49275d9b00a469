//! `POST /operations`: run one batch through the dispatcher.
//!
//! The body is a JSON array of requests. The dispatcher is synchronous, so
//! the batch runs on the blocking pool while the request holds a
//! [`BatchGuard`](crate::network::BatchGuard).

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use opfactory_core::OperationRequest;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

use super::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct OperationsQuery {
    /// Falls back to `ServerConfig::default_dry_run` when absent.
    pub dry_run: Option<bool>,
    /// Respond with the linear log form instead of one key per handler.
    #[serde(default)]
    pub flatten: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

type HandlerResult = Result<Response, (StatusCode, Json<ErrorBody>)>;

fn failure(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

/// Runs the submitted batch. Returns 200 with the outcome whenever the body
/// parses, including batches whose `errors` list is non-empty.
pub async fn operations_handler(
    State(state): State<AppState>,
    Query(query): Query<OperationsQuery>,
    Json(requests): Json<Vec<OperationRequest>>,
) -> HandlerResult {
    if !state.shutdown.health_state().accepts_batches() {
        return Err(failure(
            StatusCode::SERVICE_UNAVAILABLE,
            "server is not accepting batches",
        ));
    }

    let guard = state.shutdown.batch_guard();
    let dry_run = query.dry_run.unwrap_or(state.service_config.default_dry_run);
    let runner = Arc::clone(&state.runner);
    debug!(requests = requests.len(), dry_run, "batch received");

    let outcome = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        runner.run_batch(requests, dry_run)
    })
    .await
    .map_err(|e| {
        error!(error = %e, "batch task did not complete");
        failure(StatusCode::INTERNAL_SERVER_ERROR, "batch execution failed")
    })?;

    if query.flatten {
        let body = json!({ "results": outcome.flatten(), "errors": outcome.errors });
        return Ok(Json(body).into_response());
    }
    // Serialized directly so buckets keep first-success order.
    Ok(Json(outcome).into_response())
}
