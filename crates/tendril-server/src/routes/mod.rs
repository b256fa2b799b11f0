//! Route definitions for the REST API.

mod events;
mod health;
mod probes;
mod queries;
mod stats;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::state::AppState;

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Probe operations
        .route("/probes", post(probes::register_probe).get(probes::list_probes))
        .route(
            "/probes/:id",
            get(probes::get_probe).delete(probes::archive_probe),
        )
        .route("/probes/:id/charge", put(probes::update_charge))
        // Matching
        .route("/queries", post(queries::submit_query))
        // Observation
        .route("/stats", get(stats::get_stats))
        .route("/network", get(stats::get_network))
        .route("/events", get(events::recent_events))
        // Attach state
        .with_state(state)
}

pub use events::*;
pub use health::*;
pub use probes::*;
pub use queries::*;
pub use stats::*;
