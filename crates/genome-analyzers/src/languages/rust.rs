//! Rust analyzer using tree-sitter

use genome_core::{NodeType, Visibility};
use tree_sitter::Node;

use super::{end_line, first_doc_line, node_text, parse, start_line};
use crate::extractor::{Analyzer, Endpoint, EdgeDecl, ExtractionResult, NodeDecl, Target};

pub struct RustAnalyzer;

fn visibility_of(node: Node, source: &str) -> Visibility {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "visibility_modifier" {
            return if node_text(child, source).starts_with("pub") {
                Visibility::Public
            } else {
                Visibility::Internal
            };
        }
    }
    Visibility::Private
}

/// `#[test]` / `#[tokio::test]` attribute or `///` doc line directly above
/// the item.
fn leading_context(node: Node, source: &str) -> (bool, Option<String>) {
    let mut is_test = false;
    let mut doc = None;
    let mut prev = node.prev_sibling();
    while let Some(p) = prev {
        match p.kind() {
            "attribute_item" => {
                if node_text(p, source).contains("test") {
                    is_test = true;
                }
            }
            "line_comment" => {
                let text = node_text(p, source);
                if text.starts_with("///") && doc.is_none() {
                    doc = first_doc_line(text);
                }
            }
            _ => break,
        }
        prev = p.prev_sibling();
    }
    (is_test, doc)
}

struct Walker<'a> {
    source: &'a str,
    result: ExtractionResult,
}

impl<'a> Walker<'a> {
    fn visit(&mut self, node: Node, scope: Option<&str>, attribution: &Endpoint) {
        match node.kind() {
            "function_item" => self.function(node, scope),
            "struct_item" | "enum_item" | "trait_item" => self.type_item(node),
            "impl_item" => {
                let type_name = node
                    .child_by_field_name("type")
                    .map(|t| node_text(t, self.source).to_string());
                if let (Some(type_name), Some(body)) = (type_name, node.child_by_field_name("body"))
                {
                    let mut cursor = body.walk();
                    for child in body.children(&mut cursor) {
                        if child.kind() == "function_item" {
                            self.function(child, Some(&type_name));
                        }
                    }
                }
            }
            "use_declaration" => {
                if let Some(argument) = node.child_by_field_name("argument") {
                    self.result.edges.push(EdgeDecl::import(
                        node_text(argument, self.source),
                        start_line(node),
                    ));
                }
            }
            "mod_item" => {
                // `mod foo;` pulls in a sibling file; an inline body is
                // walked in place.
                match node.child_by_field_name("body") {
                    Some(body) => self.visit_children(body, scope, attribution),
                    None => {
                        if let Some(name) = node.child_by_field_name("name") {
                            self.result.edges.push(EdgeDecl::import(
                                format!("self::{}", node_text(name, self.source)),
                                start_line(node),
                            ));
                        }
                    }
                }
            }
            "call_expression" => {
                if let Some(function) = node.child_by_field_name("function") {
                    let callee = node_text(function, self.source)
                        .replace("::", ".")
                        .to_string();
                    if !callee.is_empty() {
                        self.result.edges.push(EdgeDecl::call(
                            attribution.clone(),
                            callee,
                            start_line(node),
                        ));
                    }
                }
                self.visit_children(node, scope, attribution);
            }
            _ => self.visit_children(node, scope, attribution),
        }
    }

    fn visit_children(&mut self, node: Node, scope: Option<&str>, attribution: &Endpoint) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, scope, attribution);
        }
    }

    fn function(&mut self, node: Node, scope: Option<&str>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source).to_string();
        let qualified = match scope {
            Some(owner) => format!("{owner}.{name}"),
            None => name.clone(),
        };
        let (is_test, doc) = leading_context(node, self.source);
        let mut decl = NodeDecl::new(
            &qualified,
            if is_test { NodeType::Test } else { NodeType::Function },
        );
        decl.visibility = visibility_of(node, self.source);
        decl.line_start = start_line(node);
        decl.line_end = end_line(node);
        decl.summary = doc;
        decl.entry_point = scope.is_none() && name == "main";
        if decl.entry_point {
            self.result.file_entry = true;
        }
        if let Some(body) = node.child_by_field_name("body") {
            let attribution = Endpoint::Symbol(qualified.clone());
            self.visit_children(body, scope, &attribution);
        }
        self.result.nodes.push(decl);
    }

    fn type_item(&mut self, node: Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source).to_string();
        let (_, doc) = leading_context(node, self.source);
        let mut decl = NodeDecl::new(&name, NodeType::Class);
        decl.visibility = visibility_of(node, self.source);
        decl.line_start = start_line(node);
        decl.line_end = end_line(node);
        decl.summary = doc;
        self.result.nodes.push(decl);
    }
}

impl Analyzer for RustAnalyzer {
    fn extract(&self, _path: &str, content: &[u8]) -> anyhow::Result<ExtractionResult> {
        let source = std::str::from_utf8(content)?;
        let tree = parse(&tree_sitter_rust::LANGUAGE.into(), source)?;
        let mut walker = Walker {
            source,
            result: ExtractionResult::default(),
        };
        walker.visit(tree.root_node(), None, &Endpoint::File);
        Ok(walker.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genome_core::EdgeType;

    fn extract(source: &str) -> ExtractionResult {
        RustAnalyzer.extract("lib.rs", source.as_bytes()).unwrap()
    }

    #[test]
    fn functions_structs_and_methods() {
        let source = "/// Frobnicates.\npub fn frob() {}\n\npub struct Engine;\n\nimpl Engine {\n    pub fn start(&self) {\n        frob();\n    }\n}\n";
        let result = extract(source);
        let frob = result.nodes.iter().find(|n| n.qualified_name == "frob").unwrap();
        assert_eq!(frob.visibility, Visibility::Public);
        assert_eq!(frob.summary.as_deref(), Some("Frobnicates."));
        assert!(result.nodes.iter().any(|n| n.qualified_name == "Engine"));
        let method = result
            .nodes
            .iter()
            .find(|n| n.qualified_name == "Engine.start")
            .unwrap();
        assert_eq!(method.node_type, NodeType::Function);
        let call = result
            .edges
            .iter()
            .find(|e| e.edge_type == EdgeType::Calls)
            .unwrap();
        assert_eq!(call.from, Endpoint::Symbol("Engine.start".into()));
    }

    #[test]
    fn main_is_entry_point() {
        let result = extract("fn main() {\n    run();\n}\n");
        assert!(result.file_entry);
        assert!(result.nodes[0].entry_point);
    }

    #[test]
    fn test_attribute_tags_tests() {
        let result = extract("#[test]\nfn checks_math() {\n    assert_eq!(2, 2);\n}\n");
        assert_eq!(result.nodes[0].node_type, NodeType::Test);
    }

    #[test]
    fn use_and_mod_become_imports() {
        let result = extract("mod auth;\nuse crate::auth::login;\n");
        let sources: Vec<_> = result
            .edges
            .iter()
            .filter_map(|e| match &e.to {
                Target::Import(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(sources, vec!["self::auth", "crate::auth::login"]);
    }

    #[test]
    fn scoped_calls_are_normalized_to_dots() {
        let result = extract("fn go() {\n    auth::login();\n}\n");
        let call = result
            .edges
            .iter()
            .find(|e| e.edge_type == EdgeType::Calls)
            .unwrap();
        assert_eq!(call.to, Target::Call("auth.login".into()));
    }
}
