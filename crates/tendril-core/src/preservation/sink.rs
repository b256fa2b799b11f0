//! Preservation records and the sink trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::convergence::{ConvergenceEvent, ConvergencePriority};
use crate::correlation::MatchResult;
use crate::error::TendrilError;

/// Record type written for convergences.
pub const CONVERGENCE_RECORD: &str = "convergence";

/// What gets archived for a high-priority convergence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreservationRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    pub query_event_id: Uuid,
    pub matches: Vec<MatchResult>,
    pub priority: ConvergencePriority,
    pub aggregate_strength: f32,
    pub timestamp: DateTime<Utc>,
}

impl PreservationRecord {
    pub fn from_convergence(convergence: &ConvergenceEvent) -> Self {
        Self {
            record_type: CONVERGENCE_RECORD.to_string(),
            query_event_id: convergence.query_event_id,
            matches: convergence.matches.clone(),
            priority: convergence.priority,
            aggregate_strength: convergence.aggregate_strength,
            timestamp: convergence.timestamp,
        }
    }
}

/// Error returned by a preservation sink.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    /// Network failure or 5xx; worth retrying
    #[error("Transient error: {0}")]
    Transient(String),
    /// Rejected by the receiver; retrying will not help
    #[error("Permanent error: {0}")]
    Permanent(String),
    /// Sink is misconfigured
    #[error("Config error: {0}")]
    Config(String),
}

impl SinkError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Transient(_))
    }

    /// Lift into the crate error, naming the sink.
    pub fn into_tendril(self, sink: &str) -> TendrilError {
        TendrilError::Preservation {
            sink: sink.to_string(),
            message: self.to_string(),
        }
    }
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Transient(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::Permanent(format!("Serialization error: {}", err))
    }
}

/// Durable destination for preserved convergences.
#[async_trait]
pub trait PreservationSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Archive one record.
    async fn preserve(&self, record: &PreservationRecord) -> Result<(), SinkError>;
}
