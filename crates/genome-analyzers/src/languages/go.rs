//! Go analyzer using tree-sitter

use genome_core::{NodeType, Visibility};
use tree_sitter::Node;

use super::{end_line, node_text, parse, start_line};
use crate::extractor::{Analyzer, Endpoint, EdgeDecl, ExtractionResult, NodeDecl};

pub struct GoAnalyzer;

fn visibility_of(name: &str) -> Visibility {
    if name.chars().next().is_some_and(|c| c.is_uppercase()) {
        Visibility::Public
    } else {
        Visibility::Private
    }
}

struct Walker<'a> {
    source: &'a str,
    test_file: bool,
    result: ExtractionResult,
}

impl<'a> Walker<'a> {
    fn visit(&mut self, node: Node, attribution: &Endpoint) {
        match node.kind() {
            "function_declaration" => self.function(node, None),
            "method_declaration" => {
                // Receiver type becomes the qualifier: `(s *Server) Run` → `Server.Run`.
                let receiver = node
                    .child_by_field_name("receiver")
                    .map(|r| {
                        node_text(r, self.source)
                            .trim_matches(['(', ')'])
                            .split_whitespace()
                            .last()
                            .unwrap_or("")
                            .trim_start_matches('*')
                            .to_string()
                    })
                    .filter(|r| !r.is_empty());
                self.function(node, receiver.as_deref());
            }
            "import_declaration" => {
                let mut cursor = node.walk();
                for spec in node
                    .named_children(&mut cursor)
                    .flat_map(|c| {
                        let mut inner = c.walk();
                        let specs: Vec<Node> = if c.kind() == "import_spec_list" {
                            c.named_children(&mut inner).collect()
                        } else if c.kind() == "import_spec" {
                            vec![c]
                        } else {
                            Vec::new()
                        };
                        specs
                    })
                    .collect::<Vec<_>>()
                {
                    if let Some(path) = spec.child_by_field_name("path") {
                        let import = node_text(path, self.source).trim_matches('"').to_string();
                        self.result
                            .edges
                            .push(EdgeDecl::import(import, start_line(node)));
                    }
                }
            }
            "call_expression" => {
                if let Some(function) = node.child_by_field_name("function") {
                    let callee = node_text(function, self.source).to_string();
                    if !callee.is_empty() {
                        self.result.edges.push(EdgeDecl::call(
                            attribution.clone(),
                            callee,
                            start_line(node),
                        ));
                    }
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

    fn function(&mut self, node: Node, receiver: Option<&str>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source).to_string();
        let qualified = match receiver {
            Some(owner) => format!("{owner}.{name}"),
            None => name.clone(),
        };
        let is_test = self.test_file && name.starts_with("Test");
        let mut decl = NodeDecl::new(
            &qualified,
            if is_test { NodeType::Test } else { NodeType::Function },
        );
        decl.visibility = visibility_of(&name);
        decl.line_start = start_line(node);
        decl.line_end = end_line(node);
        decl.entry_point = receiver.is_none() && name == "main";
        if decl.entry_point {
            self.result.file_entry = true;
        }
        if let Some(body) = node.child_by_field_name("body") {
            let attribution = Endpoint::Symbol(qualified.clone());
            self.visit_children(body, &attribution);
        }
        self.result.nodes.push(decl);
    }
}

impl Analyzer for GoAnalyzer {
    fn extract(&self, path: &str, content: &[u8]) -> anyhow::Result<ExtractionResult> {
        let source = std::str::from_utf8(content)?;
        let tree = parse(&tree_sitter_go::LANGUAGE.into(), source)?;
        let mut walker = Walker {
            source,
            test_file: path.ends_with("_test.go"),
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

    #[test]
    fn main_and_imports() {
        let source = "package main\n\nimport (\n\t\"fmt\"\n\t\"example.com/app/auth\"\n)\n\nfunc main() {\n\tauth.Login()\n}\n";
        let result = GoAnalyzer.extract("main.go", source.as_bytes()).unwrap();
        assert!(result.file_entry);
        let imports: Vec<_> = result
            .edges
            .iter()
            .filter_map(|e| match &e.to {
                Target::Import(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(imports, vec!["fmt", "example.com/app/auth"]);
    }

    #[test]
    fn methods_use_receiver_type() {
        let source = "package server\n\nfunc (s *Server) Run() {\n\ts.listen()\n}\n";
        let result = GoAnalyzer.extract("server.go", source.as_bytes()).unwrap();
        let run = result.nodes.iter().find(|n| n.qualified_name == "Server.Run").unwrap();
        assert_eq!(run.visibility, Visibility::Public);
    }

    #[test]
    fn test_functions_in_test_files() {
        let source = "package server\n\nfunc TestRun(t *testing.T) {}\n";
        let result = GoAnalyzer.extract("server_test.go", source.as_bytes()).unwrap();
        assert_eq!(result.nodes[0].node_type, NodeType::Test);
    }
}
