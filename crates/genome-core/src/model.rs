//! Core data structures for the genome graph

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current genome schema version. Loaders reject other major versions.
pub const SCHEMA_VERSION: u32 = 1;

/// Unique, stable identifier for a node.
///
/// Conventions:
/// - files: repo-relative POSIX path (`src/auth.py`)
/// - symbols: `<file-stem-path>.<qualified-name>` (`src/auth.login_user`)
/// - concepts: `concept:<slug>`
/// - unresolved imports: `ext:<resolver-key>`
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn file(path: &str) -> Self {
        NodeId(path.replace('\\', "/"))
    }

    /// Symbol id inside a file: the path with its extension dropped, dots
    /// separating package/module/class boundaries.
    pub fn symbol(file_path: &str, qualified_name: &str) -> Self {
        let stem = match file_path.rsplit_once('.') {
            Some((stem, _ext)) => stem,
            None => file_path,
        };
        NodeId(format!("{}.{}", stem.replace('\\', "/"), qualified_name))
    }

    pub fn concept(slug: &str) -> Self {
        NodeId(format!("concept:{slug}"))
    }

    pub fn external(resolver_key: &str) -> Self {
        NodeId(format!("ext:{resolver_key}"))
    }

    /// Virtual ids (concepts, external modules) are exempt from the
    /// file-resolution invariant.
    pub fn is_virtual(&self) -> bool {
        self.0.starts_with("concept:") || self.0.starts_with("ext:")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

/// Closed set of node types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    File,
    Module,
    Function,
    Class,
    Test,
    Config,
    Resource,
    Concept,
}

impl NodeType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(NodeType::File),
            "module" => Some(NodeType::Module),
            "function" => Some(NodeType::Function),
            "class" => Some(NodeType::Class),
            "test" => Some(NodeType::Test),
            "config" => Some(NodeType::Config),
            "resource" => Some(NodeType::Resource),
            "concept" => Some(NodeType::Concept),
            _ => None,
        }
    }
}

/// Closed set of edge types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Defines,
    Imports,
    Calls,
    References,
    DependsOn,
    Mutates,
    Emits,
    Tests,
}

impl EdgeType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "defines" => Some(EdgeType::Defines),
            "imports" => Some(EdgeType::Imports),
            "calls" => Some(EdgeType::Calls),
            "references" => Some(EdgeType::References),
            "depends_on" => Some(EdgeType::DependsOn),
            "mutates" => Some(EdgeType::Mutates),
            "emits" => Some(EdgeType::Emits),
            "tests" => Some(EdgeType::Tests),
        _ => None,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Internal,
    Private,
}

/// Supported languages for syntax-aware analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Language {
    Rust,
    TypeScript,
    JavaScript,
    Python,
    Go,
    Java,
    C,
    Cpp,
    Yaml,
    Toml,
    Json,
    Sql,
    Markdown,
    Shell,
    Html,
    Css,
    Other,
}

/// A bounded score in [0, 1]. Construction clamps; deserialization does not,
/// so the validator can reject hand-edited artifacts.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Score(f32);

impl Score {
    pub fn new(value: f32) -> Self {
        Score(value.clamp(0.0, 1.0))
    }

    pub fn value(&self) -> f32 {
        self.0
    }

    pub fn in_bounds(&self) -> bool {
        (0.0..=1.0).contains(&self.0) && self.0.is_finite()
    }
}

/// A single node in the genome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Repo-relative path. Required for non-concept, non-external nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub criticality: Score,
    /// Tagged as an entry point by an analyzer (`main`, `__main__` guard,
    /// exported handler).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub entry_point: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_start: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_end: Option<u32>,
}

impl Node {
    pub fn new(id: NodeId, node_type: NodeType) -> Self {
        Node {
            id,
            node_type,
            file: None,
            language: None,
            visibility: Visibility::default(),
            summary: None,
            criticality: Score::default(),
            entry_point: false,
            line_start: None,
            line_end: None,
        }
    }
}

/// Sort/dedup key for edges: `(from, to, type)` is unique in a genome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub from: NodeId,
    pub to: NodeId,
    pub edge_type: EdgeType,
}

/// A directed typed relation between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    /// 1.0 (or absent) for structural edges; < 1 for inferred ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Score>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl Edge {
    pub fn new(from: NodeId, to: NodeId, edge_type: EdgeType) -> Self {
        Edge {
            from,
            to,
            edge_type,
            confidence: None,
            line: None,
        }
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            from: self.from.clone(),
            to: self.to.clone(),
            edge_type: self.edge_type,
        }
    }
}

/// Closed tag set for flow side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SideEffect {
    #[serde(rename = "db.read")]
    DbRead,
    #[serde(rename = "db.write")]
    DbWrite,
    #[serde(rename = "net.out")]
    NetOut,
    #[serde(rename = "fs.read")]
    FsRead,
    #[serde(rename = "fs.write")]
    FsWrite,
    #[serde(rename = "cache")]
    Cache,
    #[serde(rename = "emit")]
    Emit,
}

/// An advisory execution flow derived from the call graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flow {
    pub entry: NodeId,
    pub path: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub side_effects: Vec<SideEffect>,
    pub confidence: Score,
}

/// A named grouping of existing nodes. Introduces no structural edges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Concept {
    pub id: NodeId,
    pub description: String,
    pub nodes: Vec<NodeId>,
}

/// Change history for one file, keyed by its node id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub churn_score: Score,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_major_change: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

/// Advisory risk assessment for one node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskEntry {
    pub risk_score: Score,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

/// Public-API contract, keyed by signature string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractEntry {
    pub depends_on: Vec<NodeId>,
    pub breaking_change_risk: Score,
}

/// Serialization mode tag carried in metadata.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum EncodeMode {
    #[default]
    Standard,
    Compact,
    Lite,
}

/// Genome provenance and incremental bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    pub generated_at: DateTime<Utc>,
    /// Tree hash of the analyzed state: sha256 over sorted (path, hash) pairs.
    pub repo_hash: String,
    pub languages: Vec<Language>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frameworks: Vec<String>,
    pub engine_version: String,
    pub schema_version: u32,
    #[serde(default)]
    pub mode: EncodeMode,
    /// Set when analyzer failures reduced coverage.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
    /// Monotonically increasing writer generation.
    #[serde(default)]
    pub generation: u64,
    /// Per-file content fingerprints driving incremental change detection.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fingerprints: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Metadata {
            generated_at,
            repo_hash: String::new(),
            languages: Vec::new(),
            frameworks: Vec::new(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            schema_version: SCHEMA_VERSION,
            mode: EncodeMode::Standard,
            partial: false,
            generation: 0,
            fingerprints: BTreeMap::new(),
        }
    }
}

/// Section counts surfaced in the summary and the stats resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SummaryCounts {
    pub nodes: usize,
    pub edges: usize,
    pub files: usize,
}

/// Derived overview of the repository. Computed from the genome, never
/// supplied externally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Summary {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry_points: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub core_domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hotspots: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub do_not_touch: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub architectural_style: Vec<String>,
    #[serde(default)]
    pub counts: SummaryCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_id_drops_extension() {
        let id = NodeId::symbol("src/auth.py", "login_user");
        assert_eq!(id.as_str(), "src/auth.login_user");
    }

    #[test]
    fn symbol_id_handles_extensionless_path() {
        let id = NodeId::symbol("Makefile", "all");
        assert_eq!(id.as_str(), "Makefile.all");
    }

    #[test]
    fn virtual_ids() {
        assert!(NodeId::concept("auth").is_virtual());
        assert!(NodeId::external("requests").is_virtual());
        assert!(!NodeId::file("src/main.py").is_virtual());
    }

    #[test]
    fn score_clamps_on_construction() {
        assert_eq!(Score::new(1.5).value(), 1.0);
        assert_eq!(Score::new(-0.2).value(), 0.0);
        assert!(Score::new(0.5).in_bounds());
    }

    #[test]
    fn score_deserialization_preserves_raw_value() {
        let s: Score = serde_json::from_str("3.0").unwrap();
        assert!(!s.in_bounds());
    }

    #[test]
    fn side_effect_wire_names() {
        let json = serde_json::to_string(&SideEffect::DbWrite).unwrap();
        assert_eq!(json, "\"db.write\"");
        let json = serde_json::to_string(&SideEffect::NetOut).unwrap();
        assert_eq!(json, "\"net.out\"");
    }

    #[test]
    fn edge_type_round_trip() {
        for (name, ty) in [
            ("defines", EdgeType::Defines),
            ("depends_on", EdgeType::DependsOn),
            ("tests", EdgeType::Tests),
        ] {
            assert_eq!(EdgeType::parse(name), Some(ty));
            assert_eq!(serde_json::to_string(&ty).unwrap(), format!("\"{name}\""));
        }
    }

    #[test]
    fn node_serializes_without_empty_fields() {
        let node = Node::new(NodeId::file("a.py"), NodeType::File);
        let json = serde_json::to_value(&node).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("summary"));
        assert!(!obj.contains_key("entry_point"));
        assert_eq!(obj["visibility"], "internal");
    }
}
