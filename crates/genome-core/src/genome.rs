//! The genome document and the base graph it is merged from

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::*;

/// The persisted artifact: a versioned, typed graph of the repository with
/// derived sections. Mutated only through the merger and delta application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Genome {
    pub metadata: Metadata,
    #[serde(default)]
    pub summary: Summary,
    pub nodes: BTreeMap<NodeId, Node>,
    /// Kept sorted by `(from, to, type)`; the key is unique.
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flows: Vec<Flow>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concepts: Vec<Concept>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub history: BTreeMap<NodeId, HistoryEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub risk: BTreeMap<NodeId, RiskEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub contracts: BTreeMap<String, ContractEntry>,
}

impl Genome {
    pub fn new(metadata: Metadata) -> Self {
        Genome {
            metadata,
            summary: Summary::default(),
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            flows: Vec::new(),
            concepts: Vec::new(),
            history: BTreeMap::new(),
            risk: BTreeMap::new(),
            contracts: BTreeMap::new(),
        }
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Insert an edge preserving sort order. Returns false on a duplicate
    /// `(from, to, type)` key.
    pub fn insert_edge(&mut self, edge: Edge) -> bool {
        match self.edges.binary_search_by(|e| e.key().cmp(&edge.key())) {
            Ok(_) => false,
            Err(pos) => {
                self.edges.insert(pos, edge);
                true
            }
        }
    }

    pub fn has_edge(&self, from: &NodeId, to: &NodeId, edge_type: EdgeType) -> bool {
        let key = EdgeKey {
            from: from.clone(),
            to: to.clone(),
            edge_type,
        };
        self.edges.binary_search_by(|e| e.key().cmp(&key)).is_ok()
    }

    pub fn edges_from<'a>(&'a self, from: &'a NodeId) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| &e.from == from)
    }

    pub fn edges_to<'a>(&'a self, to: &'a NodeId) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| &e.to == to)
    }

    /// Distinct languages present on nodes, sorted.
    pub fn languages(&self) -> Vec<Language> {
        let mut langs: Vec<Language> = self
            .nodes
            .values()
            .filter_map(|n| n.language)
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        langs.sort();
        langs
    }

    /// Equality modulo the volatile metadata fields (`generated_at`,
    /// `generation`, `mode`). Used by the idempotence and incremental
    /// correctness checks.
    pub fn content_eq(&self, other: &Genome) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        for m in [&mut a.metadata, &mut b.metadata] {
            m.generated_at = chrono::DateTime::<chrono::Utc>::MIN_UTC;
            m.generation = 0;
            m.mode = EncodeMode::Standard;
        }
        a == b
    }

    /// Rebuild the summary counts from the current sections.
    pub fn refresh_counts(&mut self) {
        self.summary.counts = SummaryCounts {
            nodes: self.nodes.len(),
            edges: self.edges.len(),
            files: self
                .nodes
                .values()
                .filter(|n| n.node_type == NodeType::File)
                .count(),
        };
    }
}

/// Nodes and edges derivable from per-file structural analysis, before any
/// subsystem runs. The scanner is its only producer.
#[derive(Debug, Clone, Default)]
pub struct BaseGraph {
    pub nodes: BTreeMap<NodeId, Node>,
    pub edges: BTreeMap<EdgeKey, Edge>,
}

impl BaseGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node. On duplicate id, fills empty fields from the incoming
    /// node without overwriting populated ones.
    pub fn add_node(&mut self, node: Node) {
        match self.nodes.entry(node.id.clone()) {
            std::collections::btree_map::Entry::Vacant(e) => {
                e.insert(node);
            }
            std::collections::btree_map::Entry::Occupied(mut e) => {
                let existing = e.get_mut();
                if existing.file.is_none() {
                    existing.file = node.file;
                }
                if existing.language.is_none() {
                    existing.language = node.language;
                }
                if existing.summary.is_none() {
                    existing.summary = node.summary;
                }
                existing.entry_point |= node.entry_point;
            }
        }
    }

    /// Insert an edge, deduplicating on `(from, to, type)`.
    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.entry(edge.key()).or_insert(edge);
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn remove_file(&mut self, file: &str) {
        self.nodes.retain(|_, n| n.file.as_deref() != Some(file));
        let nodes = &self.nodes;
        self.edges.retain(|_, e| {
            (nodes.contains_key(&e.from) || e.from.is_virtual())
                && (nodes.contains_key(&e.to) || e.to.is_virtual())
        });
    }

    /// Files whose `imports` edges point into any of the given files.
    pub fn importers_of(&self, files: &std::collections::BTreeSet<String>) -> Vec<String> {
        let mut out = std::collections::BTreeSet::new();
        for edge in self.edges.values() {
            if edge.edge_type != EdgeType::Imports {
                continue;
            }
            let target_file = self
                .nodes
                .get(&edge.to)
                .and_then(|n| n.file.clone())
                .unwrap_or_else(|| edge.to.as_str().to_string());
            if files.contains(&target_file) {
                if let Some(src) = self.nodes.get(&edge.from).and_then(|n| n.file.clone()) {
                    if !files.contains(&src) {
                        out.insert(src);
                    }
                }
            }
        }
        out.into_iter().collect()
    }
}

/// Extract the base-graph view back out of a merged genome. Used by the
/// incremental coordinator to re-run subsystems without a full re-scan.
pub fn base_graph_of(genome: &Genome) -> BaseGraph {
    let mut base = BaseGraph::new();
    for node in genome.nodes.values() {
        if node.node_type != NodeType::Concept {
            base.nodes.insert(node.id.clone(), node.clone());
        }
    }
    for edge in &genome.edges {
        if edge.edge_type != EdgeType::Tests {
            base.edges.insert(edge.key(), edge.clone());
        }
    }
    base
}
