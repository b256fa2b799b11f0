//! Probe CRUD endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tendril_core::{NewProbe, Probe, ProbeFilter};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

/// Register a probe.
/// POST /probes
pub async fn register_probe(
    State(state): State<AppState>,
    Json(request): Json<NewProbe>,
) -> ApiResult<(StatusCode, Json<Probe>)> {
    let probe = state.engine().register_probe(request)?;
    Ok((StatusCode::CREATED, Json(probe)))
}

/// Query parameters for listing probes.
#[derive(Debug, Default, Deserialize)]
pub struct ListProbesQuery {
    /// Exclude archived probes.
    #[serde(default)]
    pub active_only: bool,
    pub owner: Option<String>,
    /// Comma-separated tags, all of which must be present.
    pub tags: Option<String>,
}

impl From<ListProbesQuery> for ProbeFilter {
    fn from(query: ListProbesQuery) -> Self {
        let tags = query
            .tags
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        ProbeFilter {
            active_only: query.active_only,
            owner: query.owner,
            tags,
        }
    }
}

/// Response for listing probes.
#[derive(Debug, Serialize)]
pub struct ListProbesResponse {
    pub results: Vec<Probe>,
}

/// List probes in creation order.
/// GET /probes
pub async fn list_probes(
    State(state): State<AppState>,
    Query(query): Query<ListProbesQuery>,
) -> ApiResult<Json<ListProbesResponse>> {
    let results = state.engine().list_probes(&query.into())?;
    Ok(Json(ListProbesResponse { results }))
}

/// Get a specific probe by ID.
/// GET /probes/:id
pub async fn get_probe(
    State(state): State<AppState>,
    Path(probe_id): Path<Uuid>,
) -> ApiResult<Json<Probe>> {
    Ok(Json(state.engine().get_probe(probe_id)?))
}

/// Request body for changing a probe's charge.
#[derive(Debug, Deserialize)]
pub struct UpdateChargeRequest {
    pub charge: f32,
}

/// Change a probe's charge.
/// PUT /probes/:id/charge
pub async fn update_charge(
    State(state): State<AppState>,
    Path(probe_id): Path<Uuid>,
    Json(request): Json<UpdateChargeRequest>,
) -> ApiResult<Json<Probe>> {
    Ok(Json(state.engine().update_charge(probe_id, request.charge)?))
}

/// Response for archiving a probe.
#[derive(Debug, Serialize)]
pub struct ArchiveResponse {
    pub id: Uuid,
    /// False when the probe was already archived.
    pub archived: bool,
}

/// Archive a probe.
/// DELETE /probes/:id
pub async fn archive_probe(
    State(state): State<AppState>,
    Path(probe_id): Path<Uuid>,
) -> ApiResult<Json<ArchiveResponse>> {
    let engine = state.engine();
    // Unknown ids are a 404, not a no-op
    engine.get_probe(probe_id)?;
    let archived = engine.archive_probe(probe_id)?;
    Ok(Json(ArchiveResponse {
        id: probe_id,
        archived,
    }))
}
