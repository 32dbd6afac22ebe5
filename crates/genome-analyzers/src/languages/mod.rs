//! Built-in language analyzers

pub mod config;
mod ecma;
pub mod generic;
pub mod go;
pub mod java;
pub mod javascript;
pub mod python;
pub mod rust;
pub mod typescript;

use tree_sitter::{Node, Parser};

/// Parse a source buffer with the given grammar. A fresh parser per call
/// keeps analyzers reentrant across the worker pool.
pub(crate) fn parse(
    language: &tree_sitter::Language,
    source: &str,
) -> anyhow::Result<tree_sitter::Tree> {
    let mut parser = Parser::new();
    parser.set_language(language)?;
    parser
        .parse(source, None)
        .ok_or_else(|| anyhow::anyhow!("parser produced no tree"))
}

pub(crate) fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// 1-based line of a node's start.
pub(crate) fn start_line(node: Node) -> u32 {
    node.start_position().row as u32 + 1
}

pub(crate) fn end_line(node: Node) -> u32 {
    node.end_position().row as u32 + 1
}

/// First line of a doc string/comment, trimmed of quote noise.
pub(crate) fn first_doc_line(raw: &str) -> Option<String> {
    let cleaned = raw
        .trim_start_matches(['r', 'b'])
        .trim_matches(|c| c == '"' || c == '\'')
        .trim_start_matches("///")
        .trim_start_matches("//!")
        .trim_start_matches("//")
        .trim_start_matches("/*")
        .trim_end_matches("*/")
        .trim_start_matches('*')
        .trim_start_matches('#');
    let line = cleaned.lines().map(str::trim).find(|l| !l.is_empty())?;
    Some(line.to_string())
}
