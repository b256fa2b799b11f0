//! Probe network view.
//!
//! Probes that converge on the same query are linked. The tracker keeps one
//! edge per unordered probe pair; the snapshot restricts it to active probes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;
use uuid::Uuid;

use crate::convergence::ConvergenceEvent;
use crate::probe::{Probe, ProbeStatus};

/// A probe in the network view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkNode {
    pub id: Uuid,
    pub label: String,
    pub charge: f32,
    pub tags: BTreeSet<String>,
    pub status: ProbeStatus,
}

impl From<&Probe> for NetworkNode {
    fn from(probe: &Probe) -> Self {
        Self {
            id: probe.id,
            label: probe.text.clone(),
            charge: probe.charge,
            tags: probe.tags.clone(),
            status: probe.status,
        }
    }
}

/// Link between two probes that converged together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEdge {
    /// Lower id of the pair
    pub from: Uuid,
    /// Higher id of the pair
    pub to: Uuid,
    /// Running average of the aggregate strengths of shared convergences
    pub strength: f32,
    /// Number of shared convergences
    pub count: u32,
}

/// Nodes, edges and density at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
    /// edges / (n * (n - 1) / 2), or 0 with fewer than two nodes
    pub density: f32,
}

#[derive(Debug, Clone, Copy)]
struct EdgeStats {
    strength: f32,
    count: u32,
}

fn canonical(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Accumulates co-convergence edges.
#[derive(Debug, Default)]
pub struct NetworkTracker {
    edges: RwLock<HashMap<(Uuid, Uuid), EdgeStats>>,
}

impl NetworkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link every pair of probes taking part in `convergence`.
    pub fn record_convergence(&self, convergence: &ConvergenceEvent) {
        let ids: Vec<Uuid> = convergence
            .probe_ids()
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let strength = convergence.aggregate_strength;

        let mut edges = self
            .edges
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                let stats = edges.entry(canonical(*a, *b)).or_insert(EdgeStats {
                    strength: 0.0,
                    count: 0,
                });
                let n = stats.count as f32;
                stats.strength = (stats.strength * n + strength) / (n + 1.0);
                stats.count += 1;
            }
        }
    }

    /// Total edges tracked, including those touching archived probes.
    pub fn edge_count(&self) -> usize {
        self.edges
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// View over the active probes among `probes`.
    pub fn snapshot(&self, probes: &[Probe]) -> NetworkSnapshot {
        let nodes: Vec<NetworkNode> = probes
            .iter()
            .filter(|p| p.is_active())
            .map(NetworkNode::from)
            .collect();
        let active: HashSet<Uuid> = nodes.iter().map(|n| n.id).collect();

        let mut edges: Vec<NetworkEdge> = self
            .edges
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|((a, b), _)| active.contains(a) && active.contains(b))
            .map(|((a, b), stats)| NetworkEdge {
                from: *a,
                to: *b,
                strength: stats.strength,
                count: stats.count,
            })
            .collect();
        edges.sort_by(|x, y| (x.from, x.to).cmp(&(y.from, y.to)));

        let n = nodes.len();
        let density = if n < 2 {
            0.0
        } else {
            edges.len() as f32 / (n * (n - 1) / 2) as f32
        };

        NetworkSnapshot {
            nodes,
            edges,
            density,
        }
    }
}
