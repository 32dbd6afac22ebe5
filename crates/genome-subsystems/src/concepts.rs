//! Concept grouping
//!
//! Groups existing nodes into named concepts by top-level directory.
//! Concepts never introduce structural edges.

use std::collections::BTreeMap;

use genome_core::{BaseGraph, Concept, NodeId, NodeType};

fn slug_of(dir: &str) -> String {
    dir.to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect()
}

pub fn derive(base: &BaseGraph) -> Vec<Concept> {
    let mut groups: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();
    for node in base.nodes.values() {
        let Some(file) = &node.file else { continue };
        if node.node_type == NodeType::Config {
            continue;
        }
        let domain = match file.split_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => continue, // root-level files carry no domain signal
        };
        groups.entry(domain).or_default().push(node.id.clone());
    }

    groups
        .into_iter()
        .filter(|(_, members)| members.len() >= 2)
        .map(|(dir, mut members)| {
            members.sort();
            Concept {
                id: NodeId::concept(&slug_of(&dir)),
                description: dir,
                nodes: members,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use genome_core::Node;

    fn node(id: &str, file: &str) -> Node {
        let mut n = Node::new(NodeId::from(id), NodeType::Function);
        n.file = Some(file.into());
        n
    }

    #[test]
    fn groups_by_top_level_directory() {
        let mut base = BaseGraph::new();
        base.add_node(node("auth/login.login", "auth/login.py"));
        base.add_node(node("auth/token.issue", "auth/token.py"));
        base.add_node(node("billing/charge.run", "billing/charge.py"));
        let concepts = derive(&base);
        assert_eq!(concepts.len(), 1);
        assert_eq!(concepts[0].id, NodeId::concept("auth"));
        assert_eq!(concepts[0].description, "auth");
        assert_eq!(concepts[0].nodes.len(), 2);
    }

    #[test]
    fn root_level_files_are_skipped() {
        let mut base = BaseGraph::new();
        base.add_node(node("main.run", "main.py"));
        base.add_node(node("util.help", "util.py"));
        assert!(derive(&base).is_empty());
    }
}
