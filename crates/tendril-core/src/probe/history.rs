//! Bounded history of processed queries, the source of registry statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::correlation::QueryOutcome;
use crate::scoring::MatchTier;

/// What one processed query contributed to the statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query_event_id: Uuid,
    /// Strength and tier of every kept match
    pub matches: Vec<(f32, MatchTier)>,
    /// Highest strength seen, including discarded results
    pub peak_strength: f32,
    pub converged: bool,
    pub processed_at: DateTime<Utc>,
}

impl QueryRecord {
    pub fn from_outcome(outcome: &QueryOutcome) -> Self {
        Self {
            query_event_id: outcome.query_event_id,
            matches: outcome
                .matches
                .iter()
                .map(|m| (m.strength, m.tier))
                .collect(),
            peak_strength: outcome.peak_strength,
            converged: outcome.convergence.is_some(),
            processed_at: outcome.processed_at,
        }
    }
}

/// Aggregate statistics, recomputed from the retained history on every call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_probes: usize,
    pub active_probes: usize,
    pub total_matches: usize,
    pub strong_matches: usize,
    pub convergence_count: usize,
    pub average_strength: f32,
    pub peak_strength: f32,
    /// Queries currently retained in history
    pub queries_retained: usize,
}

/// FIFO ring of query records.
#[derive(Debug)]
pub(crate) struct QueryHistory {
    records: VecDeque<QueryRecord>,
    capacity: usize,
}

impl QueryHistory {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, record: QueryRecord) {
        if self.capacity == 0 {
            return;
        }
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    /// Fill the match-derived fields of `stats`.
    pub(crate) fn summarize(&self, stats: &mut RegistryStats) {
        let mut sum = 0.0f64;
        for record in &self.records {
            for (strength, tier) in &record.matches {
                stats.total_matches += 1;
                if *tier >= MatchTier::Strong {
                    stats.strong_matches += 1;
                }
                sum += *strength as f64;
            }
            if record.converged {
                stats.convergence_count += 1;
            }
            stats.peak_strength = stats.peak_strength.max(record.peak_strength);
        }
        stats.average_strength = if stats.total_matches == 0 {
            0.0
        } else {
            (sum / stats.total_matches as f64) as f32
        };
        stats.queries_retained = self.records.len();
    }
}
