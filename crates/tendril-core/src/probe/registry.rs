//! Probe registry: the single owner of mutable probe state.
//!
//! All writes to `status`, `last_matched_at` and `charge` go through this
//! type, serialized by one lock over the probe table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::history::{QueryHistory, QueryRecord, RegistryStats};
use super::types::{normalize_tags, NewProbe, Probe, ProbeFilter, ProbeStatus};
use crate::error::{TendrilError, TendrilResult};
use crate::events::{EngineEvent, EventBus, ProbeArchivedEvent, ProbeRegisteredEvent};

/// Configuration for the probe registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Lowest accepted charge. Default: 0.0
    pub min_charge: f32,
    /// Highest accepted charge. Default: 1.0
    pub max_charge: f32,
    /// Charge used when a registration omits it. Default: 0.5
    pub default_charge: f32,
    /// Match strength at which a seeking probe becomes connected. Default: 0.8
    pub connect_threshold: f32,
    /// Processed queries retained for statistics. Default: 1000
    pub history_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            min_charge: 0.0,
            max_charge: 1.0,
            default_charge: 0.5,
            connect_threshold: 0.8,
            history_capacity: 1000,
        }
    }
}

impl RegistryConfig {
    /// Validate configuration values are in valid ranges.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(self.min_charge.is_finite() && self.max_charge.is_finite()) {
            return Err("charge bounds must be finite");
        }
        if self.min_charge > self.max_charge {
            return Err("min_charge must not exceed max_charge");
        }
        if !(self.min_charge..=self.max_charge).contains(&self.default_charge) {
            return Err("default_charge must lie within the charge bounds");
        }
        if !(0.0..=1.0).contains(&self.connect_threshold) {
            return Err("connect_threshold must be between 0.0 and 1.0");
        }
        Ok(())
    }
}

/// Outcome of restoring a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub restored: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct ProbeTable {
    /// Probes in creation order.
    probes: Vec<Probe>,
    /// Id -> position in `probes`.
    index: HashMap<Uuid, usize>,
}

impl ProbeTable {
    fn get_mut(&mut self, id: Uuid) -> Option<&mut Probe> {
        let pos = *self.index.get(&id)?;
        self.probes.get_mut(pos)
    }

    fn insert(&mut self, probe: Probe) {
        self.index.insert(probe.id, self.probes.len());
        self.probes.push(probe);
    }
}

/// In-memory probe store.
pub struct ProbeRegistry {
    table: RwLock<ProbeTable>,
    history: RwLock<QueryHistory>,
    config: RegistryConfig,
    bus: Arc<EventBus>,
}

impl ProbeRegistry {
    /// Create an empty registry publishing to `bus`.
    pub fn new(config: RegistryConfig, bus: Arc<EventBus>) -> Self {
        Self {
            table: RwLock::new(ProbeTable::default()),
            history: RwLock::new(QueryHistory::new(config.history_capacity)),
            config,
            bus,
        }
    }

    /// Get the registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn read(&self) -> TendrilResult<RwLockReadGuard<'_, ProbeTable>> {
        self.table
            .read()
            .map_err(|_| TendrilError::internal("probe table lock poisoned"))
    }

    fn write(&self) -> TendrilResult<RwLockWriteGuard<'_, ProbeTable>> {
        self.table
            .write()
            .map_err(|_| TendrilError::internal("probe table lock poisoned"))
    }

    fn check_charge(&self, charge: f32) -> TendrilResult<()> {
        if !charge.is_finite() || charge < self.config.min_charge || charge > self.config.max_charge
        {
            return Err(TendrilError::InvalidCharge {
                field: "charge",
                value: charge,
                min: self.config.min_charge,
                max: self.config.max_charge,
            });
        }
        Ok(())
    }

    /// Register a new probe.
    ///
    /// Emits `ProbeRegistered` on success.
    pub fn register(&self, request: NewProbe) -> TendrilResult<Probe> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(TendrilError::EmptyIntent { field: "text" });
        }
        let owner = request.owner.trim();
        if owner.is_empty() {
            return Err(TendrilError::validation("owner", "owner must not be blank"));
        }
        let charge = request.charge.unwrap_or(self.config.default_charge);
        self.check_charge(charge)?;

        let probe = Probe {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            text: text.to_string(),
            tags: normalize_tags(&request.tags),
            charge,
            created_at: Utc::now(),
            last_matched_at: None,
            status: ProbeStatus::Seeking,
            match_count: 0,
            metadata: request.metadata,
        };

        self.write()?.insert(probe.clone());
        info!(probe_id = %probe.id, owner = %probe.owner, charge = probe.charge, "Probe registered");

        self.bus
            .publish(EngineEvent::ProbeRegistered(ProbeRegisteredEvent::new(&probe)));
        Ok(probe)
    }

    /// Fetch a probe by id.
    pub fn get(&self, id: Uuid) -> TendrilResult<Probe> {
        let table = self.read()?;
        table
            .index
            .get(&id)
            .and_then(|&pos| table.probes.get(pos))
            .cloned()
            .ok_or_else(|| TendrilError::unknown_probe(id))
    }

    /// List probes matching `filter`, in creation order.
    pub fn list(&self, filter: &ProbeFilter) -> TendrilResult<Vec<Probe>> {
        let tags = normalize_tags(&filter.tags);
        let table = self.read()?;
        Ok(table
            .probes
            .iter()
            .filter(|p| filter.matches(p, &tags))
            .cloned()
            .collect())
    }

    /// Snapshot of all active probes, in creation order.
    pub fn active(&self) -> TendrilResult<Vec<Probe>> {
        self.list(&ProbeFilter::active())
    }

    /// Record a qualifying match.
    ///
    /// Sets `last_matched_at` and connects a seeking probe when `strength`
    /// reaches the connect threshold. Archived probes are left untouched.
    pub fn record_match(
        &self,
        id: Uuid,
        timestamp: DateTime<Utc>,
        strength: f32,
    ) -> TendrilResult<()> {
        let mut table = self.write()?;
        let probe = table
            .get_mut(id)
            .ok_or_else(|| TendrilError::unknown_probe(id))?;

        if probe.status == ProbeStatus::Archived {
            debug!(probe_id = %id, "Ignoring match for archived probe");
            return Ok(());
        }

        probe.last_matched_at = Some(timestamp);
        probe.match_count = probe.match_count.saturating_add(1);
        if probe.status == ProbeStatus::Seeking && strength >= self.config.connect_threshold {
            probe.status = ProbeStatus::Connected;
            info!(probe_id = %id, strength, "Probe connected");
        }
        Ok(())
    }

    /// Archive a probe. Returns false if unknown or already archived.
    pub fn archive(&self, id: Uuid) -> TendrilResult<bool> {
        {
            let mut table = self.write()?;
            match table.get_mut(id) {
                Some(probe) if probe.status != ProbeStatus::Archived => {
                    probe.status = ProbeStatus::Archived;
                }
                _ => return Ok(false),
            }
        }
        info!(probe_id = %id, "Probe archived");
        self.bus
            .publish(EngineEvent::ProbeArchived(ProbeArchivedEvent::new(id)));
        Ok(true)
    }

    /// Change the charge of a live probe.
    pub fn update_charge(&self, id: Uuid, charge: f32) -> TendrilResult<Probe> {
        self.check_charge(charge)?;
        let mut table = self.write()?;
        let probe = table
            .get_mut(id)
            .ok_or_else(|| TendrilError::unknown_probe(id))?;
        if probe.status == ProbeStatus::Archived {
            return Err(TendrilError::validation(
                "id",
                format!("probe {} is archived", id),
            ));
        }
        probe.charge = charge;
        debug!(probe_id = %id, charge, "Probe charge updated");
        Ok(probe.clone())
    }

    /// Append a processed query to the statistics history.
    pub fn record_query(&self, record: QueryRecord) -> TendrilResult<()> {
        self.history
            .write()
            .map_err(|_| TendrilError::internal("query history lock poisoned"))?
            .push(record);
        Ok(())
    }

    /// Aggregate statistics over the probe set and retained history.
    pub fn stats(&self) -> TendrilResult<RegistryStats> {
        let mut stats = RegistryStats::default();
        {
            let table = self.read()?;
            stats.total_probes = table.probes.len();
            stats.active_probes = table.probes.iter().filter(|p| p.is_active()).count();
        }
        self.history
            .read()
            .map_err(|_| TendrilError::internal("query history lock poisoned"))?
            .summarize(&mut stats);
        Ok(stats)
    }

    /// Number of probes, archived included.
    pub fn len(&self) -> TendrilResult<usize> {
        Ok(self.read()?.probes.len())
    }

    /// Whether the registry holds no probes.
    pub fn is_empty(&self) -> TendrilResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Copy of every probe record, in creation order.
    pub fn snapshot(&self) -> TendrilResult<Vec<Probe>> {
        self.list(&ProbeFilter::default())
    }

    /// Load previously snapshotted probes.
    ///
    /// Records that are malformed, out of charge bounds, or already present
    /// are logged and skipped. No events are emitted.
    pub fn restore(&self, probes: Vec<Probe>) -> TendrilResult<RestoreReport> {
        let mut report = RestoreReport::default();
        let mut table = self.write()?;
        for mut probe in probes {
            let verdict = probe
                .check_integrity()
                .and_then(|_| self.check_charge(probe.charge));
            if let Err(err) = verdict {
                warn!(probe_id = %probe.id, error = %err, "Skipping malformed probe record");
                report.skipped += 1;
                continue;
            }
            if table.index.contains_key(&probe.id) {
                warn!(probe_id = %probe.id, "Skipping duplicate probe record");
                report.skipped += 1;
                continue;
            }
            probe.tags = normalize_tags(&probe.tags);
            table.insert(probe);
            report.restored += 1;
        }
        debug!(restored = report.restored, skipped = report.skipped, "Registry restored");
        Ok(report)
    }

    /// Insert a record without validation, for exercising corrupt-data paths.
    #[cfg(test)]
    pub(crate) fn insert_unchecked(&self, probe: Probe) {
        if let Ok(mut table) = self.table.write() {
            table.insert(probe);
        }
    }
}
