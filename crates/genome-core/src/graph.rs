//! Traversal index over a frozen genome
//!
//! Built once per snapshot; all BFS-style queries (dependencies, path
//! finding, context expansion, flow checking) run against it instead of
//! scanning the edge list.

use std::collections::{BTreeSet, HashMap, VecDeque};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::genome::{BaseGraph, Genome};
use crate::model::{Edge, EdgeType, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalDirection {
    In,
    Out,
    Both,
}

impl TraversalDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in" => Some(TraversalDirection::In),
            "out" => Some(TraversalDirection::Out),
            "both" => Some(TraversalDirection::Both),
            _ => None,
        }
    }
}

/// petgraph-backed adjacency over node ids.
pub struct GraphIndex {
    inner: StableDiGraph<NodeId, EdgeType>,
    by_id: HashMap<NodeId, NodeIndex>,
}

impl GraphIndex {
    pub fn from_genome(genome: &Genome) -> Self {
        Self::build(genome.nodes.keys(), genome.edges.iter())
    }

    pub fn from_base(base: &BaseGraph) -> Self {
        Self::build(base.nodes.keys(), base.edges.values())
    }

    fn build<'a>(
        ids: impl Iterator<Item = &'a NodeId>,
        edges: impl Iterator<Item = &'a Edge>,
    ) -> Self {
        let mut inner = StableDiGraph::new();
        let mut by_id = HashMap::new();
        for id in ids {
            let idx = inner.add_node(id.clone());
            by_id.insert(id.clone(), idx);
        }
        for edge in edges {
            if let (Some(&from), Some(&to)) = (by_id.get(&edge.from), by_id.get(&edge.to)) {
                inner.add_edge(from, to, edge.edge_type);
            }
        }
        GraphIndex { inner, by_id }
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Direct neighbors along the given direction, optionally restricted to
    /// an edge-type whitelist.
    pub fn neighbors(
        &self,
        id: &NodeId,
        direction: TraversalDirection,
        edge_types: Option<&[EdgeType]>,
    ) -> Vec<(NodeId, EdgeType)> {
        let Some(&idx) = self.by_id.get(id) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let dirs: &[Direction] = match direction {
            TraversalDirection::In => &[Direction::Incoming],
            TraversalDirection::Out => &[Direction::Outgoing],
            TraversalDirection::Both => &[Direction::Outgoing, Direction::Incoming],
        };
        for dir in dirs {
            for edge in self.inner.edges_directed(idx, *dir) {
                let ty = *edge.weight();
                if let Some(allowed) = edge_types {
                    if !allowed.contains(&ty) {
                        continue;
                    }
                }
                let other = match dir {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                out.push((self.inner[other].clone(), ty));
            }
        }
        out.sort();
        out.dedup();
        out
    }

    /// BFS expansion with cycle detection. Depth 0 yields an empty set.
    /// Returns reached ids with their distance from the start.
    pub fn expand(
        &self,
        start: &NodeId,
        direction: TraversalDirection,
        depth: usize,
        edge_types: Option<&[EdgeType]>,
    ) -> Vec<(NodeId, usize)> {
        if depth == 0 || !self.contains(start) {
            return Vec::new();
        }
        let mut seen: BTreeSet<NodeId> = BTreeSet::new();
        seen.insert(start.clone());
        let mut queue = VecDeque::from([(start.clone(), 0usize)]);
        let mut reached = Vec::new();
        while let Some((current, dist)) = queue.pop_front() {
            if dist == depth {
                continue;
            }
            for (next, _ty) in self.neighbors(&current, direction, edge_types) {
                if seen.insert(next.clone()) {
                    reached.push((next.clone(), dist + 1));
                    queue.push_back((next, dist + 1));
                }
            }
        }
        reached
    }

    /// Shortest path from `from` to `to` following outgoing edges in the
    /// whitelist, bounded by `max_len` hops. None when unreachable.
    pub fn shortest_path(
        &self,
        from: &NodeId,
        to: &NodeId,
        max_len: usize,
        edge_types: &[EdgeType],
    ) -> Option<Vec<NodeId>> {
        if !self.contains(from) || !self.contains(to) {
            return None;
        }
        if from == to {
            return Some(vec![from.clone()]);
        }
        let mut prev: HashMap<NodeId, NodeId> = HashMap::new();
        let mut seen: BTreeSet<NodeId> = BTreeSet::new();
        seen.insert(from.clone());
        let mut queue = VecDeque::from([(from.clone(), 0usize)]);
        while let Some((current, dist)) = queue.pop_front() {
            if dist == max_len {
                continue;
            }
            for (next, _ty) in self.neighbors(&current, TraversalDirection::Out, Some(edge_types)) {
                if !seen.insert(next.clone()) {
                    continue;
                }
                prev.insert(next.clone(), current.clone());
                if &next == to {
                    let mut path = vec![next.clone()];
                    let mut cursor = next;
                    while let Some(p) = prev.get(&cursor) {
                        path.push(p.clone());
                        cursor = p.clone();
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back((next, dist + 1));
            }
        }
        None
    }

    /// Structural in-degree (calls/references/imports/depends_on), used for
    /// criticality and impact scoring.
    pub fn fan_in(&self, id: &NodeId) -> usize {
        self.neighbors(
            id,
            TraversalDirection::In,
            Some(&[
                EdgeType::Calls,
                EdgeType::References,
                EdgeType::Imports,
                EdgeType::DependsOn,
            ]),
        )
        .len()
    }
}
