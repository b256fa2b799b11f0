//! Statistics and network view endpoints.

use axum::{extract::State, Json};
use tendril_core::{NetworkSnapshot, RegistryStats};

use crate::error::ApiResult;
use crate::state::AppState;

/// Aggregate match statistics.
/// GET /stats
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<RegistryStats>> {
    Ok(Json(state.engine().get_stats()?))
}

/// Active probes and their convergence links.
/// GET /network
pub async fn get_network(State(state): State<AppState>) -> ApiResult<Json<NetworkSnapshot>> {
    Ok(Json(state.engine().get_visualization()?))
}
