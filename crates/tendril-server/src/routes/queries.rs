//! Query submission endpoint.

use axum::{extract::State, Json};
use tendril_core::{QueryOutcome, QueryRequest};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Match a text against every active probe.
/// POST /queries
///
/// Scoring is CPU bound over the whole probe set, so it runs on the blocking
/// pool rather than on a runtime worker.
pub async fn submit_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Json<QueryOutcome>> {
    let engine = state.engine().clone();
    let outcome = tokio::task::spawn_blocking(move || engine.submit_query(request))
        .await
        .map_err(|e| ApiError::internal(format!("Query task failed: {}", e)))?;
    Ok(Json(outcome))
}
