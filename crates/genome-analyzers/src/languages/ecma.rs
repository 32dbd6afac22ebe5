//! Shared walker for the ECMAScript grammars (TypeScript and JavaScript)

use genome_core::{NodeType, Visibility};
use tree_sitter::Node;

use super::{end_line, node_text, parse, start_line};
use crate::extractor::{Endpoint, EdgeDecl, ExtractionResult, NodeDecl};

fn is_test_path(path: &str) -> bool {
    path.contains(".test.") || path.contains(".spec.") || path.contains("__tests__/")
}

struct Walker<'a> {
    source: &'a str,
    test_file: bool,
    result: ExtractionResult,
}

impl<'a> Walker<'a> {
    fn symbol_type(&self, default: NodeType) -> NodeType {
        if self.test_file {
            NodeType::Test
        } else {
            default
        }
    }

    fn visit(&mut self, node: Node, scope: Option<&str>, attribution: &Endpoint, exported: bool) {
        match node.kind() {
            "export_statement" => {
                if let Some(declaration) = node.child_by_field_name("declaration") {
                    self.visit(declaration, scope, attribution, true);
                } else {
                    self.visit_children(node, scope, attribution, true);
                }
            }
            "function_declaration" | "generator_function_declaration" => {
                self.function(node, scope, exported)
            }
            "class_declaration" => self.class(node, exported),
            "interface_declaration" | "type_alias_declaration" => {
                if let Some(name) = node.child_by_field_name("name") {
                    let mut decl =
                        NodeDecl::new(node_text(name, self.source), NodeType::Class);
                    decl.visibility = if exported {
                        Visibility::Public
                    } else {
                        Visibility::Internal
                    };
                    decl.line_start = start_line(node);
                    decl.line_end = end_line(node);
                    self.result.nodes.push(decl);
                }
            }
            "lexical_declaration" | "variable_declaration" => {
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    if child.kind() != "variable_declarator" {
                        continue;
                    }
                    let name = child.child_by_field_name("name");
                    let value = child.child_by_field_name("value");
                    if let (Some(name), Some(value)) = (name, value) {
                        if matches!(value.kind(), "arrow_function" | "function_expression") {
                            let qualified = node_text(name, self.source).to_string();
                            let mut decl = NodeDecl::new(
                                &qualified,
                                self.symbol_type(NodeType::Function),
                            );
                            decl.visibility = if exported {
                                Visibility::Public
                            } else {
                                Visibility::Internal
                            };
                            decl.line_start = start_line(child);
                            decl.line_end = end_line(child);
                            self.result.nodes.push(decl);
                            let attribution = Endpoint::Symbol(qualified);
                            self.visit_children(value, scope, &attribution, false);
                            continue;
                        }
                    }
                    self.visit_children(child, scope, attribution, false);
                }
            }
            "import_statement" => {
                if let Some(source) = node.child_by_field_name("source") {
                    let spec = node_text(source, self.source).trim_matches(['"', '\'']).to_string();
                    self.result.edges.push(EdgeDecl::import(spec, start_line(node)));
                }
            }
            "call_expression" => {
                if let Some(function) = node.child_by_field_name("function") {
                    let callee = node_text(function, self.source).to_string();
                    // `require("x")` is an import in CommonJS sources.
                    if callee == "require" {
                        if let Some(args) = node.child_by_field_name("arguments") {
                            let spec = node_text(args, self.source)
                                .trim_matches(['(', ')', '"', '\''])
                                .to_string();
                            if !spec.is_empty() {
                                self.result
                                    .edges
                                    .push(EdgeDecl::import(spec, start_line(node)));
                            }
                        }
                    } else if !callee.is_empty() && !callee.contains('(') {
                        self.result.edges.push(EdgeDecl::call(
                            attribution.clone(),
                            callee,
                            start_line(node),
                        ));
                    }
                }
                self.visit_children(node, scope, attribution, false);
            }
            _ => self.visit_children(node, scope, attribution, false),
        }
    }

    fn visit_children(
        &mut self,
        node: Node,
        scope: Option<&str>,
        attribution: &Endpoint,
        exported: bool,
    ) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, scope, attribution, exported);
        }
    }

    fn function(&mut self, node: Node, scope: Option<&str>, exported: bool) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source).to_string();
        let qualified = match scope {
            Some(owner) => format!("{owner}.{name}"),
            None => name.clone(),
        };
        let mut decl = NodeDecl::new(&qualified, self.symbol_type(NodeType::Function));
        decl.visibility = if exported {
            Visibility::Public
        } else {
            Visibility::Internal
        };
        decl.line_start = start_line(node);
        decl.line_end = end_line(node);
        if let Some(body) = node.child_by_field_name("body") {
            let attribution = Endpoint::Symbol(qualified.clone());
            self.visit_children(body, scope, &attribution, false);
        }
        self.result.nodes.push(decl);
    }

    fn class(&mut self, node: Node, exported: bool) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source).to_string();
        let mut decl = NodeDecl::new(&name, NodeType::Class);
        decl.visibility = if exported {
            Visibility::Public
        } else {
            Visibility::Internal
        };
        decl.line_start = start_line(node);
        decl.line_end = end_line(node);
        self.result.nodes.push(decl);
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for child in body.children(&mut cursor) {
                if child.kind() == "method_definition" {
                    if let Some(method_name) = child.child_by_field_name("name") {
                        let qualified =
                            format!("{name}.{}", node_text(method_name, self.source));
                        let mut method =
                            NodeDecl::new(&qualified, self.symbol_type(NodeType::Function));
                        method.visibility = Visibility::Internal;
                        method.line_start = start_line(child);
                        method.line_end = end_line(child);
                        self.result.nodes.push(method);
                        if let Some(method_body) = child.child_by_field_name("body") {
                            let attribution = Endpoint::Symbol(qualified);
                            self.visit_children(method_body, Some(&name), &attribution, false);
                        }
                    }
                }
            }
        }
    }
}

pub(super) fn extract_with(
    language: &tree_sitter::Language,
    path: &str,
    content: &[u8],
) -> anyhow::Result<ExtractionResult> {
    let source = std::str::from_utf8(content)?;
    let tree = parse(language, source)?;
    let mut walker = Walker {
        source,
        test_file: is_test_path(path),
        result: ExtractionResult::default(),
    };
    walker.visit(tree.root_node(), None, &Endpoint::File, false);
    Ok(walker.result)
}
