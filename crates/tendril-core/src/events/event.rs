//! Engine events.
//!
//! Events are emitted when probes are registered or archived, when a query has
//! been processed, when probes converge on a query, and when a convergence is
//! important enough to be preserved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::convergence::ConvergenceEvent;
use crate::correlation::MatchResult;
use crate::preservation::PreservationRecord;
use crate::probe::Probe;

/// Topic names events are published under.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, IntoStaticStr,
)]
pub enum EventTopic {
    #[serde(rename = "probe.registered")]
    #[strum(to_string = "probe.registered")]
    ProbeRegistered,
    #[serde(rename = "probe.archived")]
    #[strum(to_string = "probe.archived")]
    ProbeArchived,
    #[serde(rename = "query.processed")]
    #[strum(to_string = "query.processed")]
    QueryProcessed,
    #[serde(rename = "convergence.detected")]
    #[strum(to_string = "convergence.detected")]
    ConvergenceDetected,
    #[serde(rename = "preservation.requested")]
    #[strum(to_string = "preservation.requested")]
    PreservationRequested,
}

impl EventTopic {
    /// Topic name as published.
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Engine events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    ProbeRegistered(ProbeRegisteredEvent),
    ProbeArchived(ProbeArchivedEvent),
    QueryProcessed(QueryProcessedEvent),
    ConvergenceDetected(ConvergenceDetectedEvent),
    PreservationRequested(PreservationRequestedEvent),
}

impl EngineEvent {
    /// Get the topic this event is published under.
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::ProbeRegistered(_) => EventTopic::ProbeRegistered,
            Self::ProbeArchived(_) => EventTopic::ProbeArchived,
            Self::QueryProcessed(_) => EventTopic::QueryProcessed,
            Self::ConvergenceDetected(_) => EventTopic::ConvergenceDetected,
            Self::PreservationRequested(_) => EventTopic::PreservationRequested,
        }
    }

    /// Get the unique event id.
    pub fn event_id(&self) -> Uuid {
        match self {
            Self::ProbeRegistered(e) => e.event_id,
            Self::ProbeArchived(e) => e.event_id,
            Self::QueryProcessed(e) => e.event_id,
            Self::ConvergenceDetected(e) => e.event_id,
            Self::PreservationRequested(e) => e.event_id,
        }
    }

    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ProbeRegistered(e) => e.timestamp,
            Self::ProbeArchived(e) => e.timestamp,
            Self::QueryProcessed(e) => e.timestamp,
            Self::ConvergenceDetected(e) => e.convergence.timestamp,
            Self::PreservationRequested(e) => e.record.timestamp,
        }
    }
}

/// A probe was registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRegisteredEvent {
    pub event_id: Uuid,
    pub probe_id: Uuid,
    pub owner: String,
    pub text: String,
    pub tags: BTreeSet<String>,
    pub charge: f32,
    pub timestamp: DateTime<Utc>,
}

impl ProbeRegisteredEvent {
    pub fn new(probe: &Probe) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            probe_id: probe.id,
            owner: probe.owner.clone(),
            text: probe.text.clone(),
            tags: probe.tags.clone(),
            charge: probe.charge,
            timestamp: probe.created_at,
        }
    }
}

/// A probe was archived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeArchivedEvent {
    pub event_id: Uuid,
    pub probe_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl ProbeArchivedEvent {
    pub fn new(probe_id: Uuid) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            probe_id,
            timestamp: Utc::now(),
        }
    }
}

/// A query event was scored against all active probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryProcessedEvent {
    pub event_id: Uuid,
    pub query_event_id: Uuid,
    pub source_type: String,
    pub source_tag: String,
    /// Kept matches, strongest first
    pub matches: Vec<MatchResult>,
    /// Highest strength seen, including discarded results
    pub peak_strength: f32,
    pub timestamp: DateTime<Utc>,
}

/// Several probes agreed on a query event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceDetectedEvent {
    pub event_id: Uuid,
    pub convergence: ConvergenceEvent,
}

impl ConvergenceDetectedEvent {
    pub fn new(convergence: ConvergenceEvent) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            convergence,
        }
    }
}

/// A convergence should be archived by the preservation sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreservationRequestedEvent {
    pub event_id: Uuid,
    pub record: PreservationRecord,
}

impl PreservationRequestedEvent {
    pub fn new(record: PreservationRecord) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_topic_names_round_trip() {
        for topic in EventTopic::iter() {
            let parsed: EventTopic = topic.as_str().parse().unwrap();
            assert_eq!(parsed, topic);
        }
        assert_eq!(EventTopic::QueryProcessed.to_string(), "query.processed");
        assert!("query.unknown".parse::<EventTopic>().is_err());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = EngineEvent::ProbeArchived(ProbeArchivedEvent::new(Uuid::new_v4()));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"probe_archived\""));
        assert_eq!(event.topic(), EventTopic::ProbeArchived);
    }
}
