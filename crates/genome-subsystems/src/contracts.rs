//! API contract derivation
//!
//! Public symbols and route handlers form the contract surface. Breaking-
//! change risk is a pure function of the graph: dependent fan-in normalized
//! by the most-depended-on contract.

use std::collections::BTreeMap;

use genome_core::{
    BaseGraph, ContractEntry, EdgeType, GraphIndex, NodeId, NodeType, Score,
    TraversalDirection, Visibility,
};

fn signature_of(node: &genome_core::Node) -> Option<String> {
    match node.node_type {
        NodeType::Resource => Some(format!("route {}", node.id)),
        NodeType::Function | NodeType::Class if node.visibility == Visibility::Public => {
            Some(format!("fn {}", node.id))
        }
        _ => None,
    }
}

pub fn derive(base: &BaseGraph) -> BTreeMap<String, ContractEntry> {
    let index = GraphIndex::from_base(base);

    let surface: Vec<(&genome_core::Node, String, usize)> = base
        .nodes
        .values()
        .filter_map(|n| signature_of(n).map(|sig| (n, sig)))
        .map(|(n, sig)| {
            let fan_in = index.fan_in(&n.id);
            (n, sig, fan_in)
        })
        .collect();

    let max_fan_in = surface.iter().map(|(_, _, f)| *f).max().unwrap_or(0).max(1) as f32;

    surface
        .into_iter()
        .map(|(node, signature, fan_in)| {
            let mut depends_on: Vec<NodeId> = index
                .neighbors(
                    &node.id,
                    TraversalDirection::Out,
                    Some(&[EdgeType::Calls, EdgeType::Imports, EdgeType::DependsOn]),
                )
                .into_iter()
                .map(|(id, _)| id)
                .collect();
            depends_on.sort();
            depends_on.dedup();
            let entry = ContractEntry {
                depends_on,
                breaking_change_risk: Score::new(fan_in as f32 / max_fan_in),
            };
            (signature, entry)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use genome_core::{Edge, Node};

    fn public_fn(id: &str, file: &str) -> Node {
        let mut n = Node::new(NodeId::from(id), NodeType::Function);
        n.file = Some(file.into());
        n.visibility = Visibility::Public;
        n
    }

    #[test]
    fn public_symbols_form_the_surface() {
        let mut base = BaseGraph::new();
        base.add_node(public_fn("auth.login", "auth.py"));
        let mut private = Node::new(NodeId::from("auth.check"), NodeType::Function);
        private.file = Some("auth.py".into());
        private.visibility = Visibility::Private;
        base.add_node(private);

        let contracts = derive(&base);
        assert!(contracts.contains_key("fn auth.login"));
        assert!(!contracts.contains_key("fn auth.check"));
    }

    #[test]
    fn fan_in_drives_breaking_change_risk() {
        let mut base = BaseGraph::new();
        base.add_node(public_fn("auth.login", "auth.py"));
        base.add_node(public_fn("util.pad", "util.py"));
        for caller in ["a.one", "b.two", "c.three"] {
            base.add_node(public_fn(caller, "x.py"));
            base.add_edge(Edge::new(caller.into(), "auth.login".into(), EdgeType::Calls));
        }
        let contracts = derive(&base);
        assert_eq!(contracts["fn auth.login"].breaking_change_risk.value(), 1.0);
        assert_eq!(contracts["fn util.pad"].breaking_change_risk.value(), 0.0);
    }

    #[test]
    fn routes_use_the_route_signature_form() {
        let mut base = BaseGraph::new();
        let mut route = Node::new(NodeId::from("api.login"), NodeType::Resource);
        route.file = Some("api.py".into());
        base.add_node(route);
        let contracts = derive(&base);
        assert!(contracts.contains_key("route api.login"));
    }
}
