//! Python analyzer using tree-sitter

use genome_core::{NodeType, Visibility};
use tree_sitter::Node;

use super::{end_line, first_doc_line, node_text, parse, start_line};
use crate::extractor::{Analyzer, Endpoint, EdgeDecl, ExtractionResult, NodeDecl, Target};

pub struct PythonAnalyzer;

const ROUTE_MARKERS: &[&str] = &[".route", ".get", ".post", ".put", ".delete", ".patch", ".websocket"];

fn is_test_name(name: &str) -> bool {
    name.starts_with("test_") || name.starts_with("Test")
}

fn visibility_of(name: &str) -> Visibility {
    if name.starts_with('_') {
        Visibility::Private
    } else {
        Visibility::Public
    }
}

fn docstring(body: Node, source: &str) -> Option<String> {
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let inner = first.named_child(0)?;
    if inner.kind() == "string" {
        first_doc_line(node_text(inner, source))
    } else {
        None
    }
}

fn decorator_is_route(node: Node, source: &str) -> bool {
    let text = node_text(node, source);
    ROUTE_MARKERS.iter().any(|m| text.contains(m))
}

struct Walker<'a> {
    source: &'a str,
    result: ExtractionResult,
}

impl<'a> Walker<'a> {
    /// Calls made at module level (including the `__main__` guard body)
    /// attribute to the file node; calls inside a definition attribute to
    /// that symbol.
    fn visit(&mut self, node: Node, scope: Option<&str>, attribution: &Endpoint) {
        match node.kind() {
            "function_definition" => self.function(node, scope, false),
            "class_definition" => self.class(node),
            "decorated_definition" => {
                let route = (0..node.named_child_count())
                    .filter_map(|i| node.named_child(i))
                    .filter(|c| c.kind() == "decorator")
                    .any(|c| decorator_is_route(c, self.source));
                if let Some(definition) = node.child_by_field_name("definition") {
                    match definition.kind() {
                        "function_definition" => self.function(definition, scope, route),
                        "class_definition" => self.class(definition),
                        _ => {}
                    }
                }
            }
            "import_statement" => {
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    let source_name = match child.kind() {
                        "dotted_name" => Some(node_text(child, self.source)),
                        "aliased_import" => child
                            .child_by_field_name("name")
                            .map(|n| node_text(n, self.source)),
                        _ => None,
                    };
                    if let Some(name) = source_name {
                        self.result
                            .edges
                            .push(EdgeDecl::import(name, start_line(node)));
                    }
                }
            }
            "import_from_statement" => {
                if let Some(module) = node.child_by_field_name("module_name") {
                    self.result
                        .edges
                        .push(EdgeDecl::import(node_text(module, self.source), start_line(node)));
                }
            }
            "call" => {
                if let Some(function) = node.child_by_field_name("function") {
                    let callee = node_text(function, self.source);
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
            "if_statement" => {
                let guard = node
                    .child_by_field_name("condition")
                    .map(|c| node_text(c, self.source))
                    .unwrap_or("");
                if scope.is_none() && guard.contains("__name__") && guard.contains("__main__") {
                    self.result.file_entry = true;
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

    fn function(&mut self, node: Node, scope: Option<&str>, route: bool) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source).to_string();
        let qualified = match scope {
            Some(class) => format!("{class}.{name}"),
            None => name.clone(),
        };
        let node_type = if route {
            NodeType::Resource
        } else if is_test_name(&name) {
            NodeType::Test
        } else {
            NodeType::Function
        };
        let mut decl = NodeDecl::new(&qualified, node_type);
        decl.visibility = visibility_of(&name);
        decl.line_start = start_line(node);
        decl.line_end = end_line(node);
        decl.entry_point = scope.is_none() && name == "main";
        if decl.entry_point {
            self.result.file_entry = true;
        }
        if let Some(body) = node.child_by_field_name("body") {
            decl.summary = docstring(body, self.source);
            let attribution = Endpoint::Symbol(qualified.clone());
            self.visit_children(body, scope, &attribution);
        }
        self.result.nodes.push(decl);
    }

    fn class(&mut self, node: Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source).to_string();
        let mut decl = NodeDecl::new(&name, NodeType::Class);
        decl.visibility = visibility_of(&name);
        decl.line_start = start_line(node);
        decl.line_end = end_line(node);
        if let Some(body) = node.child_by_field_name("body") {
            decl.summary = docstring(body, self.source);
            // Methods declare under `Class.name`; class-body statements
            // attribute to the class's defining file.
            let mut cursor = body.walk();
            for child in body.children(&mut cursor) {
                match child.kind() {
                    "function_definition" => self.function(child, Some(&name), false),
                    "decorated_definition" => {
                        if let Some(def) = child.child_by_field_name("definition") {
                            if def.kind() == "function_definition" {
                                self.function(def, Some(&name), false);
                            }
                        }
                    }
                    _ => self.visit(child, Some(&name), &Endpoint::File),
                }
            }
        }
        self.result.nodes.push(decl);
    }
}

impl Analyzer for PythonAnalyzer {
    fn extract(&self, _path: &str, content: &[u8]) -> anyhow::Result<ExtractionResult> {
        let source = std::str::from_utf8(content)?;
        let tree = parse(&tree_sitter_python::LANGUAGE.into(), source)?;
        let mut walker = Walker {
            source,
            result: ExtractionResult::default(),
        };
        walker.visit(tree.root_node(), None, &Endpoint::File);
        Ok(walker.result)
    }
}
