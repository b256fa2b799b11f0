//! Recent event endpoint.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tendril_core::{EventTopic, RecordedEvent};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_EVENT_COUNT: usize = 50;

/// Query parameters for recent events.
#[derive(Debug, Default, Deserialize)]
pub struct RecentEventsQuery {
    pub count: Option<usize>,
    /// Topic name such as `convergence.detected`; all topics when absent.
    pub topic: Option<String>,
}

/// Response for recent events.
#[derive(Debug, Serialize)]
pub struct RecentEventsResponse {
    pub events: Vec<RecordedEvent>,
}

/// Most recent events, newest first.
/// GET /events?count=&topic=
pub async fn recent_events(
    State(state): State<AppState>,
    Query(query): Query<RecentEventsQuery>,
) -> ApiResult<Json<RecentEventsResponse>> {
    let topic = match query.topic.as_deref().map(str::trim) {
        None | Some("") | Some("*") => None,
        Some(raw) => Some(raw.parse::<EventTopic>().map_err(|_| {
            ApiError::invalid_param("topic", format!("Unknown event topic: {}", raw))
        })?),
    };
    let count = query.count.unwrap_or(DEFAULT_EVENT_COUNT);

    let events = state.engine().get_recent_events(count, topic);
    Ok(Json(RecentEventsResponse { events }))
}
