//! Java analyzer using tree-sitter

use genome_core::{NodeType, Visibility};
use tree_sitter::Node;

use super::{end_line, node_text, parse, start_line};
use crate::extractor::{Analyzer, Endpoint, EdgeDecl, ExtractionResult, NodeDecl};

pub struct JavaAnalyzer;

fn visibility_of(node: Node, source: &str) -> Visibility {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "modifiers" {
            let text = node_text(child, source);
            if text.contains("public") {
                return Visibility::Public;
            }
            if text.contains("private") {
                return Visibility::Private;
            }
        }
    }
    Visibility::Internal
}

struct Walker<'a> {
    source: &'a str,
    result: ExtractionResult,
}

impl<'a> Walker<'a> {
    fn visit(&mut self, node: Node, attribution: &Endpoint) {
        match node.kind() {
            "class_declaration" | "interface_declaration" | "enum_declaration" => {
                self.type_declaration(node)
            }
            "import_declaration" => {
                let text = node_text(node, self.source)
                    .trim_start_matches("import")
                    .trim_start_matches(" static")
                    .trim()
                    .trim_end_matches(';')
                    .to_string();
                if !text.is_empty() {
                    self.result
                        .edges
                        .push(EdgeDecl::import(text, start_line(node)));
                }
            }
            "method_invocation" => {
                let object = node
                    .child_by_field_name("object")
                    .map(|o| node_text(o, self.source));
                let name = node
                    .child_by_field_name("name")
                    .map(|n| node_text(n, self.source));
                if let Some(name) = name {
                    let callee = match object {
                        Some(obj) if !obj.is_empty() => format!("{obj}.{name}"),
                        _ => name.to_string(),
                    };
                    self.result.edges.push(EdgeDecl::call(
                        attribution.clone(),
                        callee,
                        start_line(node),
                    ));
                }
                self.visit_children(node, attribution);
            }
            _ => self.visit_children(node, attribution),
        }
    }

    fn visit_children(&mut self, node: Node, attribution: &Endpoint) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, attribution);
        }
    }

    fn type_declaration(&mut self, node: Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let class_name = node_text(name_node, self.source).to_string();
        let mut decl = NodeDecl::new(&class_name, NodeType::Class);
        decl.visibility = visibility_of(node, self.source);
        decl.line_start = start_line(node);
        decl.line_end = end_line(node);
        self.result.nodes.push(decl);

        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let mut cursor = body.walk();
        for child in body.children(&mut cursor) {
            if child.kind() != "method_declaration" {
                // Nested types and everything else.
                self.visit(child, &Endpoint::File);
                continue;
            }
            let Some(method_name) = child.child_by_field_name("name") else {
                continue;
            };
            let name = node_text(method_name, self.source).to_string();
            let qualified = format!("{class_name}.{name}");
            let is_test = node_text(child, self.source).contains("@Test")
                || name.starts_with("test");
            let mut method = NodeDecl::new(
                &qualified,
                if is_test { NodeType::Test } else { NodeType::Function },
            );
            method.visibility = visibility_of(child, self.source);
            method.line_start = start_line(child);
            method.line_end = end_line(child);
            let is_main = name == "main"
                && node_text(child, self.source).contains("static");
            method.entry_point = is_main;
            if is_main {
                self.result.file_entry = true;
            }
            self.result.nodes.push(method);
            if let Some(method_body) = child.child_by_field_name("body") {
                let attribution = Endpoint::Symbol(qualified);
                self.visit_children(method_body, &attribution);
            }
        }
    }
}

impl Analyzer for JavaAnalyzer {
    fn extract(&self, _path: &str, content: &[u8]) -> anyhow::Result<ExtractionResult> {
        let source = std::str::from_utf8(content)?;
        let tree = parse(&tree_sitter_java::LANGUAGE.into(), source)?;
        let mut walker = Walker {
            source,
            result: ExtractionResult::default(),
        };
        walker.visit(tree.root_node(), &Endpoint::File);
        Ok(walker.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::Target;
    use genome_core::EdgeType;

    #[test]
    fn classes_methods_and_main() {
        let source = "import com.example.auth.Session;\n\npublic class App {\n    public static void main(String[] args) {\n        Session.open();\n    }\n}\n";
        let result = JavaAnalyzer.extract("App.java", source.as_bytes()).unwrap();
        assert!(result.file_entry);
        assert!(result
            .nodes
            .iter()
            .any(|n| n.qualified_name == "App" && n.node_type == NodeType::Class));
        let main = result.nodes.iter().find(|n| n.qualified_name == "App.main").unwrap();
        assert!(main.entry_point);
        assert!(result
            .edges
            .iter()
            .any(|e| e.to == Target::Import("com.example.auth.Session".into())));
        let call = result
            .edges
            .iter()
            .find(|e| e.edge_type == EdgeType::Calls)
            .unwrap();
        assert_eq!(call.from, Endpoint::Symbol("App.main".into()));
        assert_eq!(call.to, Target::Call("Session.open".into()));
    }

    #[test]
    fn test_annotation_tags_tests() {
        let source = "class AppTest {\n    @Test\n    void checksLogin() {}\n}\n";
        let result = JavaAnalyzer.extract("AppTest.java", source.as_bytes()).unwrap();
        assert!(result
            .nodes
            .iter()
            .any(|n| n.qualified_name == "AppTest.checksLogin" && n.node_type == NodeType::Test));
    }
}
