//! Genome invariant validator
//!
//! Runs after every merge and delta application. A violation names the
//! failing invariant and the offending id; the prior genome is retained by
//! the caller.

use std::collections::BTreeSet;

use crate::error::{GenomeError, Result};
use crate::genome::Genome;
use crate::model::{EdgeType, NodeId, NodeType, Score, SCHEMA_VERSION};

/// A single invariant violation, also surfaced by the `validate` tool.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct Violation {
    pub invariant: String,
    pub id: String,
    pub detail: String,
}

fn check_ref(
    violations: &mut Vec<Violation>,
    genome: &Genome,
    id: &NodeId,
    context: &str,
) {
    if genome.nodes.contains_key(id) || id.is_virtual() {
        return;
    }
    violations.push(Violation {
        invariant: "edge-closure".into(),
        id: id.as_str().to_string(),
        detail: format!("{context} references a node absent from the genome"),
    });
}

fn check_score(violations: &mut Vec<Violation>, score: Score, id: &str, field: &str) {
    if !score.in_bounds() {
        violations.push(Violation {
            invariant: "bounded-scalars".into(),
            id: id.to_string(),
            detail: format!("{field} = {} outside [0, 1]", score.value()),
        });
    }
}

/// Check every genome invariant, returning all violations found.
pub fn check(genome: &Genome) -> Vec<Violation> {
    let mut violations = Vec::new();

    // 5. schema version within the supported range
    if genome.metadata.schema_version != SCHEMA_VERSION {
        violations.push(Violation {
            invariant: "schema-version".into(),
            id: genome.metadata.schema_version.to_string(),
            detail: format!("engine supports schema version {SCHEMA_VERSION}"),
        });
    }

    // 1. edge closure across every section
    for edge in &genome.edges {
        check_ref(&mut violations, genome, &edge.from, "edge");
        check_ref(&mut violations, genome, &edge.to, "edge");
    }
    for flow in &genome.flows {
        check_ref(&mut violations, genome, &flow.entry, "flow entry");
        for id in &flow.path {
            check_ref(&mut violations, genome, id, "flow path");
        }
    }
    for concept in &genome.concepts {
        for id in &concept.nodes {
            check_ref(&mut violations, genome, id, "concept");
        }
    }
    for id in genome.history.keys() {
        check_ref(&mut violations, genome, id, "history");
    }
    for id in genome.risk.keys() {
        check_ref(&mut violations, genome, id, "risk");
    }
    for contract in genome.contracts.values() {
        for id in &contract.depends_on {
            check_ref(&mut violations, genome, id, "contract");
        }
    }

    // 2. no duplicate (from, to, type)
    let mut seen = BTreeSet::new();
    for edge in &genome.edges {
        if !seen.insert(edge.key()) {
            violations.push(Violation {
                invariant: "edge-uniqueness".into(),
                id: format!("{} -> {}", edge.from, edge.to),
                detail: format!("duplicate {:?} edge", edge.edge_type),
            });
        }
    }

    // 3. bounded scalars
    for node in genome.nodes.values() {
        check_score(&mut violations, node.criticality, node.id.as_str(), "criticality");
    }
    for edge in &genome.edges {
        if let Some(c) = edge.confidence {
            check_score(
                &mut violations,
                c,
                &format!("{} -> {}", edge.from, edge.to),
                "confidence",
            );
        }
    }
    for flow in &genome.flows {
        check_score(&mut violations, flow.confidence, flow.entry.as_str(), "confidence");
    }
    for (id, entry) in &genome.history {
        check_score(&mut violations, entry.churn_score, id.as_str(), "churn_score");
    }
    for (id, entry) in &genome.risk {
        check_score(&mut violations, entry.risk_score, id.as_str(), "risk_score");
    }
    for (sig, entry) in &genome.contracts {
        check_score(&mut violations, entry.breaking_change_risk, sig, "breaking_change_risk");
    }

    // 4. every non-concept, non-external node carries a file path
    for node in genome.nodes.values() {
        if node.node_type != NodeType::Concept && !node.id.is_virtual() && node.file.is_none() {
            violations.push(Violation {
                invariant: "file-resolution".into(),
                id: node.id.as_str().to_string(),
                detail: "non-concept node without a file path".into(),
            });
        }
    }

    // 6. file defines its symbols
    for node in genome.nodes.values() {
        let is_symbol = matches!(
            node.node_type,
            NodeType::Function | NodeType::Class | NodeType::Test
        );
        if !is_symbol || node.id.is_virtual() {
            continue;
        }
        let Some(file) = &node.file else { continue };
        let file_id = NodeId::file(file);
        if genome.nodes.contains_key(&file_id)
            && !genome.has_edge(&file_id, &node.id, EdgeType::Defines)
        {
            violations.push(Violation {
                invariant: "defines-edge".into(),
                id: node.id.as_str().to_string(),
                detail: format!("{file} defines this symbol but carries no defines edge"),
            });
        }
    }

    violations
}

/// Enforce the invariants, converting the first violation into an error.
pub fn enforce(genome: &Genome) -> Result<()> {
    let violations = check(genome);
    match violations.into_iter().next() {
        None => Ok(()),
        Some(v) => Err(GenomeError::InvariantViolation {
            invariant: v.invariant,
            id: v.id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;

    fn minimal_genome() -> Genome {
        let mut g = Genome::new(Metadata::new(chrono::Utc::now()));
        let mut file = Node::new(NodeId::file("a.py"), NodeType::File);
        file.file = Some("a.py".into());
        let mut func = Node::new(NodeId::symbol("a.py", "f"), NodeType::Function);
        func.file = Some("a.py".into());
        g.nodes.insert(file.id.clone(), file);
        g.nodes.insert(func.id.clone(), func);
        g.insert_edge(Edge::new("a.py".into(), "a.f".into(), EdgeType::Defines));
        g
    }

    #[test]
    fn clean_genome_passes() {
        let g = minimal_genome();
        assert!(check(&g).is_empty());
        assert!(enforce(&g).is_ok());
    }

    #[test]
    fn dangling_edge_is_caught() {
        let mut g = minimal_genome();
        g.insert_edge(Edge::new("a.f".into(), "ghost".into(), EdgeType::Calls));
        let violations = check(&g);
        assert!(violations.iter().any(|v| v.invariant == "edge-closure"));
    }

    #[test]
    fn virtual_targets_are_exempt() {
        let mut g = minimal_genome();
        let ext = NodeId::external("requests");
        g.insert_edge(Edge::new("a.py".into(), ext, EdgeType::Imports));
        assert!(check(&g).is_empty());
    }

    #[test]
    fn out_of_range_score_is_caught() {
        let mut g = minimal_genome();
        g.history.insert(
            NodeId::file("a.py"),
            HistoryEntry {
                churn_score: serde_json::from_str("2.5").unwrap(),
                last_major_change: None,
                notes: String::new(),
            },
        );
        let violations = check(&g);
        assert!(violations.iter().any(|v| v.invariant == "bounded-scalars"));
    }

    #[test]
    fn missing_defines_edge_is_caught() {
        let mut g = minimal_genome();
        let mut orphan = Node::new(NodeId::symbol("a.py", "g"), NodeType::Function);
        orphan.file = Some("a.py".into());
        g.nodes.insert(orphan.id.clone(), orphan);
        let violations = check(&g);
        assert!(violations.iter().any(|v| v.invariant == "defines-edge"));
    }

    #[test]
    fn wrong_schema_version_is_caught() {
        let mut g = minimal_genome();
        g.metadata.schema_version = 99;
        assert!(check(&g).iter().any(|v| v.invariant == "schema-version"));
        assert!(enforce(&g).is_err());
    }
}
