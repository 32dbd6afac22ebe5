//! Test linkage
//!
//! Links test nodes to the production symbols they exercise, by name stem
//! and import affinity. A stem match in a file the test imports (or its own
//! file) wins over a bare stem match; tests with no stem match at all fall
//! back to the production files their file imports. Emits `tests` edges
//! with sub-1 confidence; the linkage is heuristic.

use std::collections::{BTreeMap, BTreeSet};

use genome_core::{BaseGraph, Edge, EdgeType, NodeId, NodeType, Score};

fn stem_of(name: &str) -> Option<String> {
    let last = name.rsplit('.').next().unwrap_or(name);
    let stripped = last
        .strip_prefix("test_")
        .or_else(|| last.strip_prefix("Test"))
        .or_else(|| last.strip_prefix("test"))?;
    if stripped.is_empty() {
        return None;
    }
    Some(stripped.to_ascii_lowercase())
}

/// Pick the best candidate for a stem: exact tier decided by the caller,
/// import-affine files first, then deterministic id order.
fn pick<'a>(
    candidates: &'a [(String, NodeId, Option<String>)],
    affinity: &BTreeSet<String>,
    stem: &str,
    exact: bool,
) -> Option<&'a (String, NodeId, Option<String>)> {
    candidates
        .iter()
        .filter(|(name, _, _)| {
            if exact {
                name.as_str() == stem
            } else {
                name.contains(stem)
            }
        })
        .min_by_key(|(_, id, file)| {
            let near = file.as_deref().is_some_and(|f| affinity.contains(f));
            (!near, id.clone())
        })
}

pub fn derive(base: &BaseGraph) -> Vec<Edge> {
    // Importing file → repo files it imports (external modules excluded).
    let mut imports_of: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
    for edge in base.edges.values() {
        if edge.edge_type != EdgeType::Imports {
            continue;
        }
        let Some(from_file) = base.nodes.get(&edge.from).and_then(|n| n.file.as_deref()) else {
            continue;
        };
        if let Some(to_file) = base.nodes.get(&edge.to).and_then(|n| n.file.clone()) {
            imports_of.entry(from_file).or_default().insert(to_file);
        }
    }

    // Candidate production symbols by lowercase trailing name, with their
    // defining file for the affinity check.
    let mut candidates: Vec<(String, NodeId, Option<String>)> = base
        .nodes
        .values()
        .filter(|n| {
            matches!(
                n.node_type,
                NodeType::Function | NodeType::Class | NodeType::Resource
            )
        })
        .map(|n| {
            let trailing = n.id.as_str().rsplit('.').next().unwrap_or(n.id.as_str());
            (trailing.to_ascii_lowercase(), n.id.clone(), n.file.clone())
        })
        .collect();
    candidates.sort();

    let mut edges = Vec::new();
    for test in base.nodes.values().filter(|n| n.node_type == NodeType::Test) {
        // Files the test plausibly exercises: everything its file imports,
        // plus its own file.
        let mut affinity: BTreeSet<String> = test
            .file
            .as_deref()
            .and_then(|f| imports_of.get(f).cloned())
            .unwrap_or_default();
        if let Some(file) = &test.file {
            affinity.insert(file.clone());
        }

        let matched = stem_of(test.id.as_str()).and_then(|stem| {
            pick(&candidates, &affinity, &stem, true)
                .or_else(|| pick(&candidates, &affinity, &stem, false))
        });
        if let Some((_, target, file)) = matched {
            let near = file.as_deref().is_some_and(|f| affinity.contains(f));
            let mut edge = Edge::new(test.id.clone(), target.clone(), EdgeType::Tests);
            edge.confidence = Some(Score::new(if near { 0.9 } else { 0.8 }));
            edges.push(edge);
            continue;
        }

        // No name match anywhere: the imported production files themselves
        // are the best available linkage.
        for file in &affinity {
            if Some(file.as_str()) == test.file.as_deref() {
                continue;
            }
            let file_id = NodeId::file(file);
            if base.nodes.contains_key(&file_id) {
                let mut edge = Edge::new(test.id.clone(), file_id, EdgeType::Tests);
                edge.confidence = Some(Score::new(0.6));
                edges.push(edge);
            }
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use genome_core::Node;

    fn node(id: &str, file: &str, ty: NodeType) -> Node {
        let mut n = Node::new(NodeId::from(id), ty);
        n.file = Some(file.into());
        n
    }

    #[test]
    fn tests_link_to_matching_production_symbols() {
        let mut base = BaseGraph::new();
        base.add_node(node("auth.login", "auth.py", NodeType::Function));
        base.add_node(node("tests/test_auth.test_login", "tests/test_auth.py", NodeType::Test));
        let edges = derive(&base);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].from, NodeId::from("tests/test_auth.test_login"));
        assert_eq!(edges[0].to, NodeId::from("auth.login"));
        assert_eq!(edges[0].edge_type, EdgeType::Tests);
        assert!(edges[0].confidence.unwrap().value() < 1.0);
    }

    #[test]
    fn imported_files_break_stem_ties() {
        let mut base = BaseGraph::new();
        // Two same-named symbols; the test file imports only billing.py.
        base.add_node(node("auth/charge.py", "auth/charge.py", NodeType::File));
        base.add_node(node("auth/charge.run", "auth/charge.py", NodeType::Function));
        base.add_node(node("billing.py", "billing.py", NodeType::File));
        base.add_node(node("billing.run", "billing.py", NodeType::Function));
        base.add_node(node("tests/test_billing.py", "tests/test_billing.py", NodeType::File));
        base.add_node(node("tests/test_billing.test_run", "tests/test_billing.py", NodeType::Test));
        base.add_edge(Edge::new(
            "tests/test_billing.py".into(),
            "billing.py".into(),
            EdgeType::Imports,
        ));

        let edges = derive(&base);
        assert_eq!(edges.len(), 1);
        // Without the affinity signal, `auth/charge.run` would win on id order.
        assert_eq!(edges[0].to, NodeId::from("billing.run"));
        assert_eq!(edges[0].confidence.unwrap().value(), 0.9);
    }

    #[test]
    fn name_mismatch_falls_back_to_imported_files() {
        let mut base = BaseGraph::new();
        base.add_node(node("auth.py", "auth.py", NodeType::File));
        base.add_node(node("auth.login", "auth.py", NodeType::Function));
        base.add_node(node("tests/test_suite.py", "tests/test_suite.py", NodeType::File));
        base.add_node(node("tests/test_suite.test_everything", "tests/test_suite.py", NodeType::Test));
        base.add_edge(Edge::new(
            "tests/test_suite.py".into(),
            "auth.py".into(),
            EdgeType::Imports,
        ));

        let edges = derive(&base);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].from, NodeId::from("tests/test_suite.test_everything"));
        assert_eq!(edges[0].to, NodeId::from("auth.py"));
        assert_eq!(edges[0].confidence.unwrap().value(), 0.6);
    }

    #[test]
    fn unmatched_isolated_tests_produce_no_edges() {
        let mut base = BaseGraph::new();
        base.add_node(node("tests/test_x.test_nothing", "tests/test_x.py", NodeType::Test));
        assert!(derive(&base).is_empty());
    }
}
