//! Probe types.
//!
//! This module defines the core types for the probe registry:
//! - `Probe`: a standing interest declaration matched against incoming text
//! - `ProbeStatus`: lifecycle state (`Seeking -> Connected -> Archived`)
//! - `NewProbe`: registration request
//! - `ProbeFilter`: list filter

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::{TendrilError, TendrilResult};

/// Lifecycle state of a probe. Transitions only move forward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProbeStatus {
    /// Registered, no strong match yet.
    Seeking,
    /// Has crossed the connect threshold at least once.
    Connected,
    /// Soft-deleted; excluded from queries. Terminal.
    Archived,
}

impl ProbeStatus {
    /// Whether the probe participates in correlation.
    pub fn is_active(self) -> bool {
        self != ProbeStatus::Archived
    }
}

/// A standing interest declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    /// Unique identifier
    pub id: Uuid,
    /// Category tag of the owner (e.g. "human", "system")
    pub owner: String,
    /// Intent description matched against query text
    pub text: String,
    /// Normalized tags (trimmed, lower-case, unique)
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Priority/intensity scalar
    pub charge: f32,
    /// When the probe was registered
    pub created_at: DateTime<Utc>,
    /// Last qualifying match (if ever)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_matched_at: Option<DateTime<Utc>>,
    /// Lifecycle state
    pub status: ProbeStatus,
    /// Number of qualifying matches recorded
    #[serde(default)]
    pub match_count: u32,
    /// Optional attributes
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Probe {
    /// Whether this probe is still matched against queries.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Check that the record is usable for scoring.
    ///
    /// Registration already guarantees this; restored or hand-built records
    /// may not.
    pub fn check_integrity(&self) -> TendrilResult<()> {
        if self.text.trim().is_empty() {
            return Err(TendrilError::malformed(self.id, "text is blank"));
        }
        if self.owner.trim().is_empty() {
            return Err(TendrilError::malformed(self.id, "owner is blank"));
        }
        if !self.charge.is_finite() {
            return Err(TendrilError::malformed(self.id, "charge is not finite"));
        }
        Ok(())
    }

    /// Whether the probe carries every one of the given (normalized) tags.
    pub fn has_all_tags(&self, tags: &BTreeSet<String>) -> bool {
        tags.is_subset(&self.tags)
    }
}

/// Normalize a tag list: trim, lower-case, drop blanks and duplicates.
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Registration request for a new probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProbe {
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Charge; the registry default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge: Option<f32>,
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_owner() -> String {
    "human".to_string()
}

impl NewProbe {
    /// Create a registration request with default owner and charge.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tags: Vec::new(),
            charge: None,
            owner: default_owner(),
            metadata: HashMap::new(),
        }
    }

    /// Builder method to set tags
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method to set charge
    pub fn with_charge(mut self, charge: f32) -> Self {
        self.charge = Some(charge);
        self
    }

    /// Builder method to set owner
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Builder method to add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Filter for listing probes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeFilter {
    /// Exclude archived probes.
    pub active_only: bool,
    /// Only probes with this owner.
    pub owner: Option<String>,
    /// Only probes carrying all of these tags.
    pub tags: Vec<String>,
}

impl ProbeFilter {
    /// Filter matching only active probes.
    pub fn active() -> Self {
        Self {
            active_only: true,
            ..Default::default()
        }
    }

    /// Builder method to restrict by owner
    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Builder method to restrict by tags
    pub fn tagged<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn matches(&self, probe: &Probe, tags: &BTreeSet<String>) -> bool {
        if self.active_only && !probe.is_active() {
            return false;
        }
        if let Some(owner) = &self.owner {
            if &probe.owner != owner {
                return false;
            }
        }
        probe.has_all_tags(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(text: &str) -> Probe {
        Probe {
            id: Uuid::new_v4(),
            owner: "human".to_string(),
            text: text.to_string(),
            tags: normalize_tags(["Research", " ai ", "research", ""]),
            charge: 0.5,
            created_at: Utc::now(),
            last_matched_at: None,
            status: ProbeStatus::Seeking,
            match_count: 0,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_normalize_tags_dedups_and_lowercases() {
        let tags = normalize_tags(["Research", " ai ", "research", ""]);
        assert_eq!(tags.len(), 2);
        assert!(tags.contains("research"));
        assert!(tags.contains("ai"));
    }

    #[test]
    fn test_status_ordering_and_activity() {
        assert!(ProbeStatus::Seeking < ProbeStatus::Connected);
        assert!(ProbeStatus::Connected < ProbeStatus::Archived);
        assert!(ProbeStatus::Connected.is_active());
        assert!(!ProbeStatus::Archived.is_active());
        assert_eq!(ProbeStatus::Connected.to_string(), "connected");
    }

    #[test]
    fn test_integrity_check() {
        assert!(probe("find collaborators").check_integrity().is_ok());

        let blank = probe("   ");
        assert!(matches!(
            blank.check_integrity(),
            Err(TendrilError::MalformedProbe { .. })
        ));

        let mut nan = probe("text");
        nan.charge = f32::NAN;
        assert!(nan.check_integrity().is_err());
    }

    #[test]
    fn test_filter_matching() {
        let mut p = probe("text");
        let tags = normalize_tags(["research"]);
        assert!(ProbeFilter::active().matches(&p, &tags));
        assert!(!ProbeFilter::default()
            .owned_by("system")
            .matches(&p, &BTreeSet::new()));

        p.status = ProbeStatus::Archived;
        assert!(!ProbeFilter::active().matches(&p, &tags));
        assert!(ProbeFilter::default().matches(&p, &tags));
    }

    #[test]
    fn test_new_probe_deserializes_with_defaults() {
        let req: NewProbe = serde_json::from_str(r#"{"text":"find peers"}"#).unwrap();
        assert_eq!(req.owner, "human");
        assert!(req.charge.is_none());
        assert!(req.tags.is_empty());
    }
}
