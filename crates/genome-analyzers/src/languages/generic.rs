//! Line-based fallback analyzer
//!
//! Code without a dedicated grammar (C/C++, shell, SQL) still gets symbol
//! coverage from a line scan: function-like declarations at column zero,
//! local includes/sources, and SQL DDL statements. Anything else keeps only
//! the file node the scanner synthesizes.

use genome_core::{Language, NodeType, Visibility};

use crate::classify::classify;
use crate::extractor::{Analyzer, EdgeDecl, ExtractionResult, NodeDecl};

pub struct GenericAnalyzer;

const C_KEYWORDS: &[&str] = &[
    "if", "else", "for", "while", "switch", "return", "sizeof", "case", "do", "goto", "typedef",
];

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// A column-zero `type name(args` line that is not a prototype, a macro
/// invocation, or control flow.
fn c_function_decl(line: &str) -> Option<(String, Visibility)> {
    if line.starts_with([' ', '\t']) || line.starts_with('#') {
        return None;
    }
    let trimmed = line.trim_end();
    if trimmed.ends_with(';')
        || trimmed.starts_with("//")
        || trimmed.starts_with("/*")
        || trimmed.starts_with('*')
    {
        return None;
    }
    let open = trimmed.find('(')?;
    let head = trimmed[..open].trim_end();
    // The name is the identifier right before `(`; requiring a separator in
    // front of it means a return type is present, which rules out bare
    // macro/function calls.
    let separator = head.rfind(|c: char| !is_ident_char(c))?;
    let name = &head[separator + 1..];
    if name.is_empty()
        || name.chars().next().is_some_and(|c| c.is_ascii_digit())
        || C_KEYWORDS.contains(&name)
    {
        return None;
    }
    let rest = &trimmed[open..];
    if !(rest.contains('{') || rest.ends_with(')') || rest.ends_with(',')) {
        return None;
    }
    let visibility = if head.starts_with("static") {
        Visibility::Private
    } else {
        Visibility::Public
    };
    Some((name.to_string(), visibility))
}

fn c_include(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix("#include")?.trim_start();
    let (open, close) = match rest.chars().next()? {
        '"' => ('"', '"'),
        '<' => ('<', '>'),
        _ => return None,
    };
    let inner = rest.strip_prefix(open)?;
    let end = inner.find(close)?;
    let path = &inner[..end];
    if path.is_empty() {
        return None;
    }
    Some(path.to_string())
}

/// `name() {`, `function name() {`, or `function name {`.
fn shell_function_decl(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let keyword = trimmed.strip_prefix("function ");
    let rest = keyword.unwrap_or(trimmed).trim_start();
    let end = rest.find(|c: char| !is_ident_char(c))?;
    if end == 0 {
        return None;
    }
    let (name, tail) = rest.split_at(end);
    let tail = tail.trim_start();
    if tail.starts_with("()") || (keyword.is_some() && tail.starts_with('{')) {
        Some(name.to_string())
    } else {
        None
    }
}

fn shell_source(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let rest = trimmed
        .strip_prefix("source ")
        .or_else(|| trimmed.strip_prefix(". "))?;
    let target = rest.split_whitespace().next()?;
    Some(target.trim_matches(['"', '\'']).to_string())
}

fn sql_declaration(line: &str) -> Option<(String, NodeType)> {
    let rest = strip_prefix_ci(line.trim_start(), "create ")?;
    let rest = strip_prefix_ci(rest, "or replace ").unwrap_or(rest);
    for (keyword, node_type) in [
        ("function ", NodeType::Function),
        ("procedure ", NodeType::Function),
        ("view ", NodeType::Resource),
        ("table ", NodeType::Resource),
    ] {
        if let Some(tail) = strip_prefix_ci(rest, keyword) {
            let tail = strip_prefix_ci(tail, "if not exists ").unwrap_or(tail);
            let name: String = tail
                .chars()
                .take_while(|c| is_ident_char(*c) || *c == '.')
                .collect();
            if !name.is_empty() {
                return Some((name, node_type));
            }
        }
    }
    None
}

fn push_decl(
    result: &mut ExtractionResult,
    name: String,
    node_type: NodeType,
    visibility: Visibility,
    line: u32,
) {
    if result.nodes.iter().any(|n| n.qualified_name == name) {
        return;
    }
    let mut decl = NodeDecl::new(&name, node_type);
    decl.visibility = visibility;
    decl.line_start = line;
    decl.line_end = line;
    decl.entry_point = name == "main";
    if decl.entry_point {
        result.file_entry = true;
    }
    result.nodes.push(decl);
}

fn scan_c(source: &str, result: &mut ExtractionResult) {
    for (index, line) in source.lines().enumerate() {
        let line_no = index as u32 + 1;
        if let Some(include) = c_include(line) {
            result.edges.push(EdgeDecl::import(include, line_no));
            continue;
        }
        if let Some((name, visibility)) = c_function_decl(line) {
            push_decl(result, name, NodeType::Function, visibility, line_no);
        }
    }
}

fn scan_shell(source: &str, result: &mut ExtractionResult) {
    for (index, line) in source.lines().enumerate() {
        let line_no = index as u32 + 1;
        if let Some(target) = shell_source(line) {
            result.edges.push(EdgeDecl::import(target, line_no));
            continue;
        }
        if let Some(name) = shell_function_decl(line) {
            push_decl(result, name, NodeType::Function, Visibility::Internal, line_no);
        }
    }
}

fn scan_sql(source: &str, result: &mut ExtractionResult) {
    for (index, line) in source.lines().enumerate() {
        let line_no = index as u32 + 1;
        if let Some((name, node_type)) = sql_declaration(line) {
            push_decl(result, name, node_type, Visibility::Public, line_no);
        }
    }
}

impl Analyzer for GenericAnalyzer {
    fn extract(&self, path: &str, content: &[u8]) -> anyhow::Result<ExtractionResult> {
        let mut result = ExtractionResult::default();
        let Ok(source) = std::str::from_utf8(content) else {
            return Ok(result);
        };
        match classify(path, Some(content)).language {
            Some(Language::C) | Some(Language::Cpp) => scan_c(source, &mut result),
            Some(Language::Shell) => scan_shell(source, &mut result),
            Some(Language::Sql) => scan_sql(source, &mut result),
            _ => {}
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::Target;

    #[test]
    fn c_functions_includes_and_main() {
        let source = "#include \"util.h\"\n#include <stdio.h>\n\nint add(int a, int b);\n\nstatic void helper(void) {\n}\n\nint main(int argc, char **argv) {\n    helper();\n}\n";
        let result = GenericAnalyzer.extract("app.c", source.as_bytes()).unwrap();

        let helper = result.nodes.iter().find(|n| n.qualified_name == "helper").unwrap();
        assert_eq!(helper.visibility, Visibility::Private);
        let main = result.nodes.iter().find(|n| n.qualified_name == "main").unwrap();
        assert!(main.entry_point);
        assert!(result.file_entry);
        // The prototype never becomes a node.
        assert!(result.nodes.iter().all(|n| n.qualified_name != "add"));

        let imports: Vec<_> = result
            .edges
            .iter()
            .filter_map(|e| match &e.to {
                Target::Import(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(imports, vec!["util.h", "stdio.h"]);
    }

    #[test]
    fn c_control_flow_is_not_a_function() {
        let source = "} else if (done) {\n    cleanup();\n}\n";
        let result = GenericAnalyzer.extract("app.c", source.as_bytes()).unwrap();
        assert!(result.nodes.is_empty());
    }

    #[test]
    fn shell_functions_and_sourced_files() {
        let source = "#!/bin/sh\nsource lib.sh\n\ndeploy() {\n  echo deploying\n}\n\nfunction clean {\n  rm -rf build\n}\n";
        let result = GenericAnalyzer.extract("deploy.sh", source.as_bytes()).unwrap();

        let names: Vec<_> = result.nodes.iter().map(|n| n.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["deploy", "clean"]);
        assert!(result
            .edges
            .iter()
            .any(|e| e.to == Target::Import("lib.sh".into())));
    }

    #[test]
    fn sql_ddl_statements() {
        let source = "CREATE TABLE IF NOT EXISTS users (id int);\n\ncreate or replace function get_user(id int)\nreturns record as $$\nselect * from users;\n$$;\n";
        let result = GenericAnalyzer.extract("schema.sql", source.as_bytes()).unwrap();

        let users = result.nodes.iter().find(|n| n.qualified_name == "users").unwrap();
        assert_eq!(users.node_type, NodeType::Resource);
        let get_user = result.nodes.iter().find(|n| n.qualified_name == "get_user").unwrap();
        assert_eq!(get_user.node_type, NodeType::Function);
    }

    #[test]
    fn unknown_text_yields_only_the_file_node() {
        let result = GenericAnalyzer.extract("notes", b"plain prose, no code").unwrap();
        assert!(result.nodes.is_empty());
        assert!(result.edges.is_empty());
    }
}
