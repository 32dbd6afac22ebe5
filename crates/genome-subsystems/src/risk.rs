//! Risk scoring
//!
//! Combines churn, structural fan-in, and entry-point exposure into a
//! bounded per-node risk entry with human-readable reasons.

use std::collections::BTreeMap;

use genome_core::{BaseGraph, GraphIndex, HistoryEntry, NodeId, RiskEntry, Score};

const CHURN_WEIGHT: f32 = 0.5;
const FAN_IN_WEIGHT: f32 = 0.4;
const ENTRY_WEIGHT: f32 = 0.1;
const REPORT_FLOOR: f32 = 0.05;

pub fn derive(
    base: &BaseGraph,
    history: &BTreeMap<NodeId, HistoryEntry>,
) -> BTreeMap<NodeId, RiskEntry> {
    let index = GraphIndex::from_base(base);
    let fan_ins: BTreeMap<&NodeId, usize> = base
        .nodes
        .keys()
        .map(|id| (id, index.fan_in(id)))
        .collect();
    let max_fan_in = fan_ins.values().copied().max().unwrap_or(0).max(1) as f32;

    base.nodes
        .values()
        .filter_map(|node| {
            let churn = node
                .file
                .as_ref()
                .and_then(|f| history.get(&NodeId::file(f)))
                .map(|h| h.churn_score.value())
                .unwrap_or(0.0);
            let fan_in_norm = fan_ins.get(&node.id).copied().unwrap_or(0) as f32 / max_fan_in;
            let entry = if node.entry_point { 1.0 } else { 0.0 };
            let score =
                CHURN_WEIGHT * churn + FAN_IN_WEIGHT * fan_in_norm + ENTRY_WEIGHT * entry;
            if score < REPORT_FLOOR {
                return None;
            }
            let mut reasons = Vec::new();
            if churn > 0.5 {
                reasons.push("high recent churn".to_string());
            }
            if fan_in_norm > 0.5 {
                reasons.push("heavily depended upon".to_string());
            }
            if node.entry_point {
                reasons.push("entry point".to_string());
            }
            Some((
                node.id.clone(),
                RiskEntry {
                    risk_score: Score::new(score),
                    reasons,
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use genome_core::{Edge, EdgeType, Node, NodeType};

    #[test]
    fn heavily_called_hot_files_score_high() {
        let mut base = BaseGraph::new();
        let mut target = Node::new(NodeId::from("auth.login"), NodeType::Function);
        target.file = Some("auth.py".into());
        base.add_node(target);
        for caller in ["a.f", "b.g"] {
            let mut n = Node::new(NodeId::from(caller), NodeType::Function);
            n.file = Some("x.py".into());
            base.add_node(n);
            base.add_edge(Edge::new(caller.into(), "auth.login".into(), EdgeType::Calls));
        }
        let mut history = BTreeMap::new();
        history.insert(
            NodeId::from("auth.py"),
            HistoryEntry {
                churn_score: Score::new(1.0),
                last_major_change: None,
                notes: String::new(),
            },
        );
        let risk = derive(&base, &history);
        let entry = &risk[&NodeId::from("auth.login")];
        assert!(entry.risk_score.value() > 0.8);
        assert!(entry.reasons.iter().any(|r| r.contains("churn")));
        assert!(entry.reasons.iter().any(|r| r.contains("depended")));
    }

    #[test]
    fn quiet_isolated_nodes_are_omitted() {
        let mut base = BaseGraph::new();
        let mut n = Node::new(NodeId::from("util.pad"), NodeType::Function);
        n.file = Some("util.py".into());
        base.add_node(n);
        assert!(derive(&base, &BTreeMap::new()).is_empty());
    }
}
