//! Analyzer capability definition
//!
//! One operation: `extract(path, content)`. Analyzers are side-effect free,
//! reentrant, and never read any file other than the one handed to them.
//! Failures surface as diagnostics, never as scan aborts.

use genome_core::{Diagnostic, EdgeType, NodeType, Visibility};

/// A symbol found in one file, before id normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDecl {
    /// Dotted within-file qualified name (`Class.method`, `handler`).
    pub qualified_name: String,
    pub node_type: NodeType,
    pub visibility: Visibility,
    pub entry_point: bool,
    pub line_start: u32,
    pub line_end: u32,
    /// First docstring/doc-comment line, when present.
    pub summary: Option<String>,
}

impl NodeDecl {
    pub fn new(qualified_name: impl Into<String>, node_type: NodeType) -> Self {
        NodeDecl {
            qualified_name: qualified_name.into(),
            node_type,
            visibility: Visibility::default(),
            entry_point: false,
            line_start: 0,
            line_end: 0,
            summary: None,
        }
    }
}

/// Edge origin, relative to the analyzed file.
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    /// The file node itself (module-level statements).
    File,
    /// A symbol declared in this file, by qualified name.
    Symbol(String),
}

/// Edge target, resolved later by the scanner.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// A symbol declared in this same file.
    Local(String),
    /// An import source string (`b`, `./util`, `crate::auth`), resolved to a
    /// file node or an `ext:` virtual module.
    Import(String),
    /// A callee as written, possibly dotted (`b.greet`), resolved through
    /// the import table and the global symbol table.
    Call(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeDecl {
    pub from: Endpoint,
    pub to: Target,
    pub edge_type: EdgeType,
    pub line: Option<u32>,
}

impl EdgeDecl {
    pub fn import(source: impl Into<String>, line: u32) -> Self {
        EdgeDecl {
            from: Endpoint::File,
            to: Target::Import(source.into()),
            edge_type: EdgeType::Imports,
            line: Some(line),
        }
    }

    pub fn call(from: Endpoint, callee: impl Into<String>, line: u32) -> Self {
        EdgeDecl {
            from,
            to: Target::Call(callee.into()),
            edge_type: EdgeType::Calls,
            line: Some(line),
        }
    }
}

/// What one analyzer run produced for one file. `defines` edges are
/// synthesized by the scanner from the declared nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResult {
    pub nodes: Vec<NodeDecl>,
    pub edges: Vec<EdgeDecl>,
    pub diagnostics: Vec<Diagnostic>,
    /// The file itself is an entry point (`__main__` guard, `main` symbol).
    pub file_entry: bool,
}

pub trait Analyzer: Send + Sync {
    fn extract(&self, path: &str, content: &[u8]) -> anyhow::Result<ExtractionResult>;
}
