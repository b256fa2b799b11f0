//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub active_probes: usize,
    /// Event subscribers whose handlers have failed since startup
    pub handler_failures: u64,
}

/// Health check endpoint.
/// GET /health
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let engine = state.engine();
    let stats = engine.get_stats()?;

    Ok(Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime_secs(),
        active_probes: stats.active_probes,
        handler_failures: engine.bus().handler_failures(),
    }))
}
