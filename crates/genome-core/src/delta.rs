//! Genome deltas for incremental updates

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::genome::Genome;
use crate::model::*;
use crate::validate;

/// Replacement values for derived sections. `None` leaves a section alone;
/// `Some` replaces it wholesale (sections are single-owner, so a patch is
/// always a full re-derivation by that owner).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SectionPatches {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flows: Option<Vec<Flow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concepts: Option<Vec<Concept>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<BTreeMap<NodeId, HistoryEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<BTreeMap<NodeId, RiskEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contracts: Option<BTreeMap<String, ContractEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
}

/// The minimal change set transforming one genome into another.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GenomeDelta {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes_remove: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes_replace: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes_add: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges_remove: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges_add: Vec<Edge>,
    #[serde(default)]
    pub section_patches: SectionPatches,
}

impl GenomeDelta {
    pub fn is_empty(&self) -> bool {
        self.nodes_remove.is_empty()
            && self.nodes_replace.is_empty()
            && self.nodes_add.is_empty()
            && self.edges_remove.is_empty()
            && self.edges_add.is_empty()
            && self.section_patches == SectionPatches::default()
    }

    pub fn change_count(&self) -> usize {
        self.nodes_remove.len()
            + self.nodes_replace.len()
            + self.nodes_add.len()
            + self.edges_remove.len()
            + self.edges_add.len()
    }
}

/// Apply a delta atomically: the input genome is untouched unless the result
/// validates. Apply order is removes, replaces, adds, edges last.
pub fn apply(genome: &Genome, delta: &GenomeDelta) -> Result<Genome> {
    let mut next = genome.clone();

    for id in &delta.nodes_remove {
        next.nodes.remove(id);
    }
    // Drop edges that referenced removed nodes; the delta's edges_add may
    // re-introduce recomputed ones.
    let nodes = &next.nodes;
    next.edges.retain(|e| {
        (nodes.contains_key(&e.from) || e.from.is_virtual())
            && (nodes.contains_key(&e.to) || e.to.is_virtual())
    });

    for node in &delta.nodes_replace {
        next.nodes.insert(node.id.clone(), node.clone());
    }
    for node in &delta.nodes_add {
        next.nodes.insert(node.id.clone(), node.clone());
    }

    for edge in &delta.edges_remove {
        let key = edge.key();
        if let Ok(pos) = next.edges.binary_search_by(|e| e.key().cmp(&key)) {
            next.edges.remove(pos);
        }
    }
    for edge in &delta.edges_add {
        next.insert_edge(edge.clone());
    }

    let patches = &delta.section_patches;
    if let Some(flows) = &patches.flows {
        next.flows = flows.clone();
    }
    if let Some(concepts) = &patches.concepts {
        next.concepts = concepts.clone();
    }
    if let Some(history) = &patches.history {
        next.history = history.clone();
    }
    if let Some(risk) = &patches.risk {
        next.risk = risk.clone();
    }
    if let Some(contracts) = &patches.contracts {
        next.contracts = contracts.clone();
    }
    if let Some(summary) = &patches.summary {
        next.summary = summary.clone();
    }

    next.refresh_counts();
    validate::enforce(&next)?;
    Ok(next)
}

/// Structural difference between two genomes, as served by the `diff`
/// resource.
pub fn between(old: &Genome, new: &Genome) -> GenomeDelta {
    let mut delta = GenomeDelta::default();
    for (id, node) in &new.nodes {
        match old.nodes.get(id) {
            None => delta.nodes_add.push(node.clone()),
            Some(prev) if prev != node => delta.nodes_replace.push(node.clone()),
            Some(_) => {}
        }
    }
    for id in old.nodes.keys() {
        if !new.nodes.contains_key(id) {
            delta.nodes_remove.push(id.clone());
        }
    }
    for edge in &new.edges {
        if !old.has_edge(&edge.from, &edge.to, edge.edge_type) {
            delta.edges_add.push(edge.clone());
        }
    }
    for edge in &old.edges {
        if !new.has_edge(&edge.from, &edge.to, edge.edge_type) {
            delta.edges_remove.push(edge.clone());
        }
    }
    delta
}
