//! The merger: the one place that crosses section boundaries
//!
//! Combines the base graph with subsystem outputs into a validated genome.
//! No other component mutates a genome; readers get snapshots, writers go
//! through here or through delta application.

use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::genome::{BaseGraph, Genome};
use crate::model::*;
use crate::summary;
use crate::validate;

/// Outputs collected from the auxiliary subsystems, in merge order.
/// Each section has a single owner; `None` means the subsystem was disabled
/// or skipped.
#[derive(Debug, Clone, Default)]
pub struct SubsystemOutputs {
    pub flows: Option<Vec<Flow>>,
    pub concepts: Option<Vec<Concept>>,
    pub history: Option<BTreeMap<NodeId, HistoryEntry>>,
    pub contracts: Option<BTreeMap<String, ContractEntry>>,
    pub risk: Option<BTreeMap<NodeId, RiskEntry>>,
    /// `tests` edges linking test nodes to production nodes.
    pub test_edges: Option<Vec<Edge>>,
}

pub struct Merger<'a> {
    config: &'a EngineConfig,
}

impl<'a> Merger<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Merger { config }
    }

    /// Merge policy: node union, edge dedup, single-owner sections,
    /// compaction, validation. Violations abort; nothing is published.
    pub fn merge(
        &self,
        base: BaseGraph,
        outputs: SubsystemOutputs,
        metadata: Metadata,
    ) -> Result<Genome> {
        let mut genome = Genome::new(metadata);

        for (id, mut node) in base.nodes {
            if let Some(s) = &node.summary {
                if s.len() > self.config.max_summary_length {
                    node.summary = Some(truncate(s, self.config.max_summary_length));
                }
            }
            genome.nodes.insert(id, node);
        }
        for edge in base.edges.into_values() {
            genome.insert_edge(edge);
        }
        if let Some(test_edges) = outputs.test_edges {
            for edge in test_edges {
                genome.insert_edge(edge);
            }
        }

        if let Some(flows) = outputs.flows {
            genome.flows = flows;
        }
        if let Some(concepts) = outputs.concepts {
            genome.concepts = concepts;
        }
        if let Some(history) = outputs.history {
            // History is keyed by file ids that exist in the base graph.
            genome.history = history
                .into_iter()
                .filter(|(id, _)| genome.nodes.contains_key(id))
                .collect();
        }
        if let Some(contracts) = outputs.contracts {
            genome.contracts = contracts;
        }
        if let Some(risk) = outputs.risk {
            genome.risk = risk
                .into_iter()
                .filter(|(id, _)| genome.nodes.contains_key(id) || id.is_virtual())
                .collect();
        }

        summary::assign_criticality(&mut genome);
        self.compact(&mut genome);
        genome.metadata.languages = genome.languages();
        summary::derive(&mut genome, self.config);
        validate::enforce(&genome)?;
        Ok(genome)
    }

    /// Drop nodes with no incoming or outgoing edges, unless they are files
    /// or entry points. Section entries for dropped nodes go with them.
    fn compact(&self, genome: &mut Genome) {
        let mut connected: std::collections::BTreeSet<NodeId> = std::collections::BTreeSet::new();
        for edge in &genome.edges {
            connected.insert(edge.from.clone());
            connected.insert(edge.to.clone());
        }
        let dropped: Vec<NodeId> = genome
            .nodes
            .values()
            .filter(|n| {
                // A node whose id is its own path is a file, whatever its
                // type (config, resource, doc); those always survive.
                let is_file = n.file.as_deref() == Some(n.id.as_str())
                    || n.node_type == NodeType::File;
                !is_file && !n.entry_point && !connected.contains(&n.id)
            })
            .map(|n| n.id.clone())
            .collect();
        if dropped.is_empty() {
            return;
        }
        tracing::debug!(count = dropped.len(), "compaction dropped isolated nodes");
        for id in &dropped {
            genome.nodes.remove(id);
            genome.risk.remove(id);
            genome.history.remove(id);
        }
        for concept in &mut genome.concepts {
            concept.nodes.retain(|id| !dropped.contains(id));
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
