//! Server state management.

use std::sync::Arc;
use std::time::Instant;

use tendril_core::TendrilEngine;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<TendrilEngine>,
    started_at: Instant,
}

impl AppState {
    /// Wrap an engine for sharing across handlers.
    pub fn new(engine: TendrilEngine) -> Self {
        Self::from_arc(Arc::new(engine))
    }

    /// Share an engine that is already reference counted.
    pub fn from_arc(engine: Arc<TendrilEngine>) -> Self {
        Self {
            engine,
            started_at: Instant::now(),
        }
    }

    /// Get the engine.
    pub fn engine(&self) -> &Arc<TendrilEngine> {
        &self.engine
    }

    /// Seconds since the state was created.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
