//! JavaScript analyzer using tree-sitter

use super::ecma;
use crate::extractor::{Analyzer, ExtractionResult};

pub struct JavaScriptAnalyzer;

impl Analyzer for JavaScriptAnalyzer {
    fn extract(&self, path: &str, content: &[u8]) -> anyhow::Result<ExtractionResult> {
        ecma::extract_with(&tree_sitter_javascript::LANGUAGE.into(), path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::Target;
    use genome_core::NodeType;

    #[test]
    fn require_counts_as_import() {
        let source = "const util = require(\"./util\");\nfunction go() {\n    util.run();\n}\n";
        let result = JavaScriptAnalyzer.extract("index.js", source.as_bytes()).unwrap();
        assert!(result.edges.iter().any(|e| e.to == Target::Import("./util".into())));
        assert!(result.nodes.iter().any(|n| n.qualified_name == "go"));
    }

    #[test]
    fn arrow_functions_declare_symbols() {
        let source = "const handler = (req) => {\n    respond(req);\n};\n";
        let result = JavaScriptAnalyzer.extract("index.js", source.as_bytes()).unwrap();
        let handler = result.nodes.iter().find(|n| n.qualified_name == "handler").unwrap();
        assert_eq!(handler.node_type, NodeType::Function);
    }
}
