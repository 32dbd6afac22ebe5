//! Flow derivation
//!
//! Walks `calls` edges outward from entry points and records the paths as
//! advisory flows. Side-effect tags come from a fixed keyword table over
//! callee names; confidence drops below 1 when a hop was inferred.

use std::collections::BTreeSet;

use genome_core::{
    BaseGraph, EdgeType, EngineConfig, Flow, GraphIndex, NodeId, Score, SideEffect,
    TraversalDirection,
};

const MAX_DEPTH: usize = 8;

fn side_effects_of(id: &NodeId) -> Vec<SideEffect> {
    let name = id.as_str().to_ascii_lowercase();
    let mut tags = BTreeSet::new();
    let db = name.contains("db") || name.contains("sql") || name.contains("query");
    if db {
        if name.contains("write") || name.contains("insert") || name.contains("update") || name.contains("save") || name.contains("delete") {
            tags.insert(SideEffect::DbWrite);
        } else {
            tags.insert(SideEffect::DbRead);
        }
    }
    if name.contains("http") || name.contains("request") || name.contains("fetch") || name.contains("download") {
        tags.insert(SideEffect::NetOut);
    }
    if name.contains("file") || name.contains("fs_") || name.contains(".fs") {
        if name.contains("write") || name.contains("save") || name.contains("dump") {
            tags.insert(SideEffect::FsWrite);
        } else {
            tags.insert(SideEffect::FsRead);
        }
    }
    if name.contains("cache") {
        tags.insert(SideEffect::Cache);
    }
    if name.contains("emit") || name.contains("publish") || name.contains("notify") {
        tags.insert(SideEffect::Emit);
    }
    tags.into_iter().collect()
}

/// Derive flows from the base graph. Every emitted flow starts at an entry
/// point and every consecutive pair on its path has a `calls` edge.
pub fn derive(base: &BaseGraph, config: &EngineConfig) -> Vec<Flow> {
    let index = GraphIndex::from_base(base);
    let mut entries: Vec<&NodeId> = base
        .nodes
        .values()
        .filter(|n| n.entry_point)
        .map(|n| &n.id)
        .collect();
    entries.sort();

    let mut flows = Vec::new();
    for entry in entries {
        let mut stack = vec![(vec![entry.clone()], 1.0f32)];
        while let Some((path, confidence)) = stack.pop() {
            if flows.len() >= config.flow_limit {
                tracing::debug!(limit = config.flow_limit, "flow limit reached, truncating");
                return flows;
            }
            let last = path.last().cloned().unwrap_or_else(|| entry.clone());
            let next: Vec<NodeId> = if path.len() > MAX_DEPTH {
                Vec::new()
            } else {
                index
                    .neighbors(&last, TraversalDirection::Out, Some(&[EdgeType::Calls]))
                    .into_iter()
                    .map(|(id, _)| id)
                    .filter(|id| !path.contains(id))
                    .collect()
            };
            if next.is_empty() {
                if path.len() > 1 {
                    let side_effects: Vec<SideEffect> = {
                        let mut tags = BTreeSet::new();
                        for id in &path {
                            tags.extend(side_effects_of(id));
                        }
                        tags.into_iter().collect()
                    };
                    flows.push(Flow {
                        entry: entry.clone(),
                        path,
                        side_effects,
                        confidence: Score::new(confidence),
                    });
                }
                continue;
            }
            for target in next {
                let hop_confidence = base
                    .edges
                    .get(&genome_core::Edge::new(last.clone(), target.clone(), EdgeType::Calls).key())
                    .and_then(|e| e.confidence)
                    .map(|s| s.value())
                    .unwrap_or(1.0);
                let mut extended = path.clone();
                extended.push(target);
                stack.push((extended, confidence * hop_confidence));
            }
        }
    }
    flows
}

#[cfg(test)]
mod tests {
    use super::*;
    use genome_core::{Edge, Node, NodeType};

    fn base() -> BaseGraph {
        let mut base = BaseGraph::new();
        let mut main = Node::new(NodeId::from("main.py"), NodeType::File);
        main.file = Some("main.py".into());
        main.entry_point = true;
        base.add_node(main);
        for id in ["main.run", "main.save_db", "db.write_db"] {
            let mut n = Node::new(NodeId::from(id), NodeType::Function);
            n.file = Some("main.py".into());
            base.add_node(n);
        }
        base.add_edge(Edge::new("main.py".into(), "main.run".into(), EdgeType::Calls));
        base.add_edge(Edge::new("main.run".into(), "main.save_db".into(), EdgeType::Calls));
        base
    }

    #[test]
    fn flows_start_at_entry_points() {
        let flows = derive(&base(), &EngineConfig::default());
        assert_eq!(flows.len(), 1);
        let flow = &flows[0];
        assert_eq!(flow.entry, NodeId::from("main.py"));
        assert_eq!(
            flow.path,
            vec![
                NodeId::from("main.py"),
                NodeId::from("main.run"),
                NodeId::from("main.save_db")
            ]
        );
        assert_eq!(flow.confidence.value(), 1.0);
    }

    #[test]
    fn consecutive_pairs_have_call_edges() {
        let b = base();
        let flows = derive(&b, &EngineConfig::default());
        for flow in &flows {
            for pair in flow.path.windows(2) {
                let key = Edge::new(pair[0].clone(), pair[1].clone(), EdgeType::Calls).key();
                assert!(b.edges.contains_key(&key));
            }
        }
    }

    #[test]
    fn db_write_side_effect_is_tagged() {
        let flows = derive(&base(), &EngineConfig::default());
        assert!(flows[0].side_effects.contains(&SideEffect::DbWrite));
    }

    #[test]
    fn no_entry_points_no_flows() {
        let mut b = base();
        if let Some(n) = b.nodes.get_mut(&NodeId::from("main.py")) {
            n.entry_point = false;
        }
        assert!(derive(&b, &EngineConfig::default()).is_empty());
    }

    #[test]
    fn flow_limit_is_honored() {
        let config = EngineConfig {
            flow_limit: 0,
            ..Default::default()
        };
        assert!(derive(&base(), &config).is_empty());
    }
}
