//! Query operations: filtered pages, node lookups, traversal, path
//! finding, and comparison

use serde_json::{json, Map, Value};

use genome_core::encode::canonical_field;
use genome_core::{
    EdgeType, EngineConfig, Genome, GenomeError, GraphIndex, Node, NodeId, Result,
    TraversalDirection,
};

use crate::filter::{field_value, Predicate};

/// Default edge-type whitelist for path finding.
pub const PATH_EDGE_TYPES: &[EdgeType] = &[
    EdgeType::Defines,
    EdgeType::Imports,
    EdgeType::Calls,
    EdgeType::DependsOn,
];

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub page: usize,
    pub page_size: Option<usize>,
    pub fields: Option<Vec<String>>,
    pub ids_only: bool,
    pub max_summary_length: Option<usize>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            page: 1,
            page_size: None,
            fields: None,
            ids_only: false,
            max_summary_length: None,
        }
    }
}

impl QueryOptions {
    pub fn from_payload(payload: &Value) -> Self {
        QueryOptions {
            page: payload
                .get("page")
                .and_then(Value::as_u64)
                .map(|p| p.max(1) as usize)
                .unwrap_or(1),
            page_size: payload
                .get("page_size")
                .and_then(Value::as_u64)
                .map(|p| p as usize),
            fields: payload.get("fields").and_then(Value::as_array).map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            }),
            ids_only: payload
                .get("ids_only")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            max_summary_length: payload
                .get("max_summary_length")
                .and_then(Value::as_u64)
                .map(|v| v as usize),
        }
    }

    /// Cache-key discriminator; covers every option that affects bytes.
    pub fn cache_key(&self) -> String {
        format!(
            "p{}:s{:?}:f{:?}:i{}:m{:?}",
            self.page, self.page_size, self.fields, self.ids_only, self.max_summary_length
        )
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PageResult {
    pub items: Vec<Value>,
    pub page: usize,
    pub page_size: usize,
    pub total_count: usize,
    pub total_pages: usize,
}

/// Project a node into a JSON object. Requested field names (long or
/// compact) are echoed back verbatim as the output keys.
pub fn project(node: &Node, fields: Option<&[String]>, max_summary: Option<usize>) -> Value {
    let mut out = Map::new();
    match fields {
        Some(fields) => {
            for requested in fields {
                let canonical = canonical_field(requested);
                let mut value = if canonical == "id" {
                    Value::String(node.id.as_str().to_string())
                } else {
                    field_value(node, canonical)
                };
                if canonical == "summary" {
                    value = truncate_summary(value, max_summary);
                }
                out.insert(requested.clone(), value);
            }
        }
        None => {
            let mut value = serde_json::to_value(node).unwrap_or(Value::Null);
            if let Some(obj) = value.as_object_mut() {
                if let Some(summary) = obj.get_mut("summary") {
                    let truncated = truncate_summary(summary.take(), max_summary);
                    *summary = truncated;
                }
                out = std::mem::take(obj);
            }
        }
    }
    Value::Object(out)
}

fn truncate_summary(value: Value, max: Option<usize>) -> Value {
    match (value, max) {
        (Value::String(s), Some(max)) if s.len() > max => {
            let mut end = max;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            Value::String(s[..end].to_string())
        }
        (v, _) => v,
    }
}

/// Filtered, deterministic (NodeId-ordered), paginated query.
pub fn query(
    genome: &Genome,
    predicate: &Predicate,
    options: &QueryOptions,
    config: &EngineConfig,
) -> Result<PageResult> {
    let page_size = options
        .page_size
        .unwrap_or(config.page_size)
        .clamp(1, config.page_size_cap);
    let matched: Vec<&Node> = genome
        .nodes
        .values()
        .filter(|n| predicate.matches(n))
        .collect();
    let total_count = matched.len();
    let total_pages = total_count.div_ceil(page_size);
    let start = (options.page - 1) * page_size;

    let items: Vec<Value> = matched
        .into_iter()
        .skip(start)
        .take(page_size)
        .map(|n| {
            if options.ids_only {
                Value::String(n.id.as_str().to_string())
            } else {
                project(
                    n,
                    options.fields.as_deref(),
                    options.max_summary_length.or(Some(config.max_summary_length)),
                )
            }
        })
        .collect();

    Ok(PageResult {
        items,
        page: options.page,
        page_size,
        total_count,
        total_pages,
    })
}

#[derive(Debug, Clone, Default)]
pub struct NodeOptions {
    pub max_depth: usize,
    pub include_edges: bool,
    pub edge_types: Option<Vec<EdgeType>>,
    pub fields: Option<Vec<String>>,
}

/// Node plus incoming/outgoing edges; `max_depth >= 2` BFS-expands the
/// neighborhood.
pub fn get_node(genome: &Genome, id: &NodeId, options: &NodeOptions) -> Result<Value> {
    let node = genome
        .node(id)
        .ok_or_else(|| GenomeError::not_found(format!("node {id}")))?;
    let mut out = Map::new();
    out.insert(
        "node".into(),
        project(node, options.fields.as_deref(), None),
    );

    if options.include_edges || options.max_depth > 0 {
        let edge_filter = |ty: EdgeType| {
            options
                .edge_types
                .as_ref()
                .map(|allowed| allowed.contains(&ty))
                .unwrap_or(true)
        };
        let incoming: Vec<Value> = genome
            .edges_to(id)
            .filter(|e| edge_filter(e.edge_type))
            .map(|e| serde_json::to_value(e).unwrap_or(Value::Null))
            .collect();
        let outgoing: Vec<Value> = genome
            .edges_from(id)
            .filter(|e| edge_filter(e.edge_type))
            .map(|e| serde_json::to_value(e).unwrap_or(Value::Null))
            .collect();
        out.insert("incoming_edges".into(), Value::Array(incoming));
        out.insert("outgoing_edges".into(), Value::Array(outgoing));
    }

    if options.max_depth >= 2 {
        let index = GraphIndex::from_genome(genome);
        let reached = index.expand(
            id,
            TraversalDirection::Both,
            options.max_depth,
            options.edge_types.as_deref(),
        );
        let neighborhood: Vec<Value> = reached
            .into_iter()
            .filter_map(|(nid, dist)| {
                genome.node(&nid).map(|n| {
                    json!({
                        "node": project(n, options.fields.as_deref(), None),
                        "distance": dist,
                    })
                })
            })
            .collect();
        out.insert("neighborhood".into(), Value::Array(neighborhood));
    }
    Ok(Value::Object(out))
}

/// BFS dependency expansion as a subgraph view.
pub fn dependencies(
    genome: &Genome,
    id: &NodeId,
    direction: TraversalDirection,
    depth: usize,
    config: &EngineConfig,
) -> Result<Value> {
    if genome.node(id).is_none() {
        return Err(GenomeError::not_found(format!("node {id}")));
    }
    let depth = depth.min(config.depth_cap);
    let index = GraphIndex::from_genome(genome);
    let reached = index.expand(id, direction, depth, None);

    let mut ids: Vec<NodeId> = vec![id.clone()];
    ids.extend(reached.iter().map(|(n, _)| n.clone()));
    let id_set: std::collections::BTreeSet<&NodeId> = ids.iter().collect();

    let nodes: Vec<Value> = ids
        .iter()
        .filter_map(|nid| genome.node(nid))
        .map(|n| project(n, None, None))
        .collect();
    let edges: Vec<Value> = genome
        .edges
        .iter()
        .filter(|e| id_set.contains(&e.from) && id_set.contains(&e.to))
        .map(|e| serde_json::to_value(e).unwrap_or(Value::Null))
        .collect();

    Ok(json!({
        "root": id.as_str(),
        "depth": depth,
        "nodes": nodes,
        "edges": edges,
    }))
}

/// Shortest path over the edge-type whitelist; `NotFound` when nothing is
/// reachable within `max_len`.
pub fn find_path(
    genome: &Genome,
    from: &NodeId,
    to: &NodeId,
    max_len: usize,
    edge_types: Option<&[EdgeType]>,
) -> Result<Vec<NodeId>> {
    for id in [from, to] {
        if genome.node(id).is_none() {
            return Err(GenomeError::not_found(format!("node {id}")));
        }
    }
    let index = GraphIndex::from_genome(genome);
    index
        .shortest_path(from, to, max_len, edge_types.unwrap_or(PATH_EDGE_TYPES))
        .ok_or_else(|| {
            GenomeError::not_found(format!("no path from {from} to {to} within {max_len} hops"))
        })
}

/// Field-by-field diff of two nodes plus their relationship diff. Either
/// side may come from a prior genome.
pub fn compare(
    genome: &Genome,
    a: (&NodeId, Option<&Genome>),
    b: (&NodeId, Option<&Genome>),
) -> Result<Value> {
    let resolve = |(id, source): (&NodeId, Option<&Genome>)| -> Result<(Value, Vec<String>)> {
        let g = source.unwrap_or(genome);
        let node = g
            .node(id)
            .ok_or_else(|| GenomeError::not_found(format!("node {id}")))?;
        let relations: Vec<String> = g
            .edges_from(id)
            .map(|e| format!("{:?} -> {}", e.edge_type, e.to))
            .chain(g.edges_to(id).map(|e| format!("{:?} <- {}", e.edge_type, e.from)))
            .collect();
        Ok((project(node, None, None), relations))
    };
    let (left, left_rel) = resolve(a)?;
    let (right, right_rel) = resolve(b)?;

    let mut field_diff = Map::new();
    let empty = Map::new();
    let left_obj = left.as_object().unwrap_or(&empty);
    let right_obj = right.as_object().unwrap_or(&empty);
    let keys: std::collections::BTreeSet<&String> =
        left_obj.keys().chain(right_obj.keys()).collect();
    for key in keys {
        let l = left_obj.get(key).cloned().unwrap_or(Value::Null);
        let r = right_obj.get(key).cloned().unwrap_or(Value::Null);
        if l != r {
            field_diff.insert(key.clone(), json!({"a": l, "b": r}));
        }
    }

    let only_a: Vec<&String> = left_rel.iter().filter(|r| !right_rel.contains(r)).collect();
    let only_b: Vec<&String> = right_rel.iter().filter(|r| !left_rel.contains(r)).collect();

    Ok(json!({
        "fields": field_diff,
        "relationships": { "only_a": only_a, "only_b": only_b },
    }))
}

/// Aggregate counts served by the `stats` resource.
pub fn stats(genome: &Genome) -> Value {
    let mut by_type: std::collections::BTreeMap<String, usize> = Default::default();
    let mut by_language: std::collections::BTreeMap<String, usize> = Default::default();
    let mut criticality_sum = 0.0f64;
    for node in genome.nodes.values() {
        let ty = serde_json::to_value(node.node_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        *by_type.entry(ty).or_default() += 1;
        if let Some(lang) = node.language {
            *by_language.entry(format!("{lang:?}")).or_default() += 1;
        }
        criticality_sum += node.criticality.value() as f64;
    }
    let mut by_edge_type: std::collections::BTreeMap<String, usize> = Default::default();
    for edge in &genome.edges {
        let ty = serde_json::to_value(edge.edge_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        *by_edge_type.entry(ty).or_default() += 1;
    }
    let node_count = genome.node_count();
    json!({
        "nodes": node_count,
        "edges": genome.edge_count(),
        "flows": genome.flows.len(),
        "concepts": genome.concepts.len(),
        "contracts": genome.contracts.len(),
        "by_type": by_type,
        "by_language": by_language,
        "by_edge_type": by_edge_type,
        "avg_criticality": if node_count > 0 { criticality_sum / node_count as f64 } else { 0.0 },
        "generation": genome.metadata.generation,
        "repo_hash": genome.metadata.repo_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use genome_core::{Edge, Metadata, NodeType, Visibility};

    fn genome() -> Genome {
        let mut g = Genome::new(Metadata::new(chrono::Utc::now()));
        for i in 0..5 {
            let id = NodeId::from(format!("m.f{i}").as_str());
            let mut n = Node::new(id.clone(), NodeType::Function);
            n.file = Some("m.py".into());
            n.language = Some(genome_core::Language::Python);
            n.visibility = Visibility::Public;
            g.nodes.insert(id, n);
        }
        let mut file = Node::new(NodeId::from("m.py"), NodeType::File);
        file.file = Some("m.py".into());
        file.language = Some(genome_core::Language::Python);
        g.nodes.insert(file.id.clone(), file);
        for i in 0..5 {
            g.insert_edge(Edge::new(
                "m.py".into(),
                format!("m.f{i}").as_str().into(),
                EdgeType::Defines,
            ));
        }
        g.insert_edge(Edge::new("m.f0".into(), "m.f1".into(), EdgeType::Calls));
        g.insert_edge(Edge::new("m.f1".into(), "m.f2".into(), EdgeType::Calls));
        g
    }

    #[test]
    fn projection_returns_exactly_the_requested_keys() {
        let g = genome();
        let predicate =
            Predicate::parse(&json!({"type": "function", "language": "Python"})).unwrap();
        let options = QueryOptions {
            page: 1,
            page_size: Some(3),
            fields: Some(vec!["id".into(), "f".into()]),
            ..Default::default()
        };
        let page = query(&g, &predicate, &options, &EngineConfig::default()).unwrap();
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.total_count, 5);
        assert_eq!(page.total_pages, 2);
        for item in &page.items {
            let obj = item.as_object().unwrap();
            assert_eq!(obj.len(), 2);
            assert!(obj.contains_key("id"));
            assert!(obj.contains_key("f"));
        }
    }

    #[test]
    fn ids_only_returns_strings() {
        let g = genome();
        let predicate = Predicate::parse(&json!({"type": "function"})).unwrap();
        let options = QueryOptions {
            ids_only: true,
            ..Default::default()
        };
        let page = query(&g, &predicate, &options, &EngineConfig::default()).unwrap();
        assert!(page.items.iter().all(Value::is_string));
    }

    #[test]
    fn query_is_deterministic() {
        let g = genome();
        let predicate = Predicate::parse(&json!({"type": "function"})).unwrap();
        let options = QueryOptions::default();
        let a = serde_json::to_string(&query(&g, &predicate, &options, &EngineConfig::default()).unwrap()).unwrap();
        let b = serde_json::to_string(&query(&g, &predicate, &options, &EngineConfig::default()).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn page_size_is_capped() {
        let g = genome();
        let config = EngineConfig {
            page_size_cap: 2,
            ..Default::default()
        };
        let predicate = Predicate::parse(&json!({})).unwrap();
        let options = QueryOptions {
            page_size: Some(500),
            ..Default::default()
        };
        let page = query(&g, &predicate, &options, &config).unwrap();
        assert_eq!(page.page_size, 2);
    }

    #[test]
    fn get_node_includes_edges() {
        let g = genome();
        let options = NodeOptions {
            include_edges: true,
            ..Default::default()
        };
        let value = get_node(&g, &"m.f1".into(), &options).unwrap();
        assert_eq!(value["incoming_edges"].as_array().unwrap().len(), 2);
        assert_eq!(value["outgoing_edges"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn get_node_missing_is_not_found() {
        let g = genome();
        assert!(matches!(
            get_node(&g, &"ghost".into(), &NodeOptions::default()),
            Err(GenomeError::NotFound { .. })
        ));
    }

    #[test]
    fn dependencies_returns_subgraph() {
        let g = genome();
        let value = dependencies(
            &g,
            &"m.f0".into(),
            TraversalDirection::Out,
            3,
            &EngineConfig::default(),
        )
        .unwrap();
        let nodes = value["nodes"].as_array().unwrap();
        assert_eq!(nodes.len(), 3); // f0, f1, f2
    }

    #[test]
    fn find_path_and_not_reachable() {
        let g = genome();
        let path = find_path(&g, &"m.py".into(), &"m.f2".into(), 4, None).unwrap();
        assert!(path.len() <= 4);
        assert_eq!(path.first().unwrap().as_str(), "m.py");
        assert_eq!(path.last().unwrap().as_str(), "m.f2");
        assert!(matches!(
            find_path(&g, &"m.f2".into(), &"m.py".into(), 2, None),
            Err(GenomeError::NotFound { .. })
        ));
    }

    #[test]
    fn compare_diffs_fields_and_relations() {
        let g = genome();
        let diff = compare(&g, (&"m.f0".into(), None), (&"m.f3".into(), None)).unwrap();
        assert!(diff["fields"].as_object().unwrap().contains_key("id"));
        assert!(!diff["relationships"]["only_a"].as_array().unwrap().is_empty());
    }
}
