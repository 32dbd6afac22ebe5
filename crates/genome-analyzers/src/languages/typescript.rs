//! TypeScript analyzer using tree-sitter

use super::ecma;
use crate::extractor::{Analyzer, ExtractionResult};

pub struct TypeScriptAnalyzer;

impl Analyzer for TypeScriptAnalyzer {
    fn extract(&self, path: &str, content: &[u8]) -> anyhow::Result<ExtractionResult> {
        let language = if path.ends_with(".tsx") {
            tree_sitter_typescript::LANGUAGE_TSX
        } else {
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT
        };
        ecma::extract_with(&language.into(), path, content)
    }
}
