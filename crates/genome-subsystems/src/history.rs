//! Change-history derivation
//!
//! Pulls per-file activity from the `HistorySource` capability and
//! normalizes change counts into churn scores.

use std::collections::BTreeMap;

use genome_core::{BaseGraph, HistoryEntry, HistorySource, NodeId, NodeType, Score};

pub fn derive(base: &BaseGraph, source: &dyn HistorySource) -> BTreeMap<NodeId, HistoryEntry> {
    let activities: Vec<(NodeId, genome_core::FileActivity)> = base
        .nodes
        .values()
        .filter(|n| {
            matches!(
                n.node_type,
                NodeType::File | NodeType::Config | NodeType::Resource
            ) && n.file.as_deref() == Some(n.id.as_str())
        })
        .filter_map(|n| {
            let file = n.file.as_deref()?;
            source.activity(file).map(|a| (n.id.clone(), a))
        })
        .collect();

    let max_changes = activities
        .iter()
        .map(|(_, a)| a.change_count)
        .max()
        .unwrap_or(0)
        .max(1) as f32;

    activities
        .into_iter()
        .map(|(id, activity)| {
            let churn = activity.change_count as f32 / max_changes;
            let entry = HistoryEntry {
                churn_score: Score::new(churn),
                last_major_change: Some(activity.last_modified),
                notes: format!("{} change(s) in the observation window", activity.change_count),
            };
            (id, entry)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use genome_core::{FileActivity, Node, StaticHistory};

    #[test]
    fn churn_is_normalized_by_the_busiest_file() {
        let mut base = BaseGraph::new();
        for path in ["a.py", "b.py"] {
            let mut n = Node::new(NodeId::from(path), NodeType::File);
            n.file = Some(path.into());
            base.add_node(n);
        }
        let now = chrono::Utc::now();
        let source = StaticHistory::new()
            .with("a.py", FileActivity { last_modified: now, change_count: 10 })
            .with("b.py", FileActivity { last_modified: now, change_count: 5 });

        let history = derive(&base, &source);
        assert_eq!(history[&NodeId::from("a.py")].churn_score.value(), 1.0);
        assert_eq!(history[&NodeId::from("b.py")].churn_score.value(), 0.5);
    }

    #[test]
    fn files_without_activity_are_omitted() {
        let mut base = BaseGraph::new();
        let mut n = Node::new(NodeId::from("a.py"), NodeType::File);
        n.file = Some("a.py".into());
        base.add_node(n);
        let history = derive(&base, &StaticHistory::new());
        assert!(history.is_empty());
    }
}
