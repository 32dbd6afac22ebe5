//! Config file analyzer (YAML / TOML / JSON)
//!
//! Emits one config node per top-level key. Parse failures become
//! diagnostics, never scan aborts.

use genome_core::{Diagnostic, Language, NodeType, Visibility};

use crate::extractor::{Analyzer, ExtractionResult, NodeDecl};

pub struct ConfigAnalyzer {
    pub language: Language,
}

fn top_level_keys_json(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

impl Analyzer for ConfigAnalyzer {
    fn extract(&self, path: &str, content: &[u8]) -> anyhow::Result<ExtractionResult> {
        let mut result = ExtractionResult::default();
        let source = match std::str::from_utf8(content) {
            Ok(s) => s,
            Err(e) => {
                result
                    .diagnostics
                    .push(Diagnostic::warning(path, format!("not UTF-8: {e}")));
                return Ok(result);
            }
        };

        let keys = match self.language {
            Language::Json => match serde_json::from_str::<serde_json::Value>(source) {
                Ok(value) => top_level_keys_json(&value),
                Err(e) => {
                    result
                        .diagnostics
                        .push(Diagnostic::warning(path, format!("invalid JSON: {e}")));
                    return Ok(result);
                }
            },
            Language::Yaml => match serde_yaml::from_str::<serde_yaml::Value>(source) {
                Ok(serde_yaml::Value::Mapping(map)) => map
                    .keys()
                    .filter_map(|k| k.as_str().map(str::to_string))
                    .collect(),
                Ok(_) => Vec::new(),
                Err(e) => {
                    result
                        .diagnostics
                        .push(Diagnostic::warning(path, format!("invalid YAML: {e}")));
                    return Ok(result);
                }
            },
            Language::Toml => match source.parse::<toml::Table>() {
                Ok(table) => table.keys().cloned().collect(),
                Err(e) => {
                    result
                        .diagnostics
                        .push(Diagnostic::warning(path, format!("invalid TOML: {e}")));
                    return Ok(result);
                }
            },
            _ => Vec::new(),
        };

        for key in keys {
            let mut decl = NodeDecl::new(&key, NodeType::Config);
            decl.visibility = Visibility::Internal;
            result.nodes.push(decl);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_top_level_tables() {
        let analyzer = ConfigAnalyzer {
            language: Language::Toml,
        };
        let result = analyzer
            .extract("Cargo.toml", b"[package]\nname = \"x\"\n\n[dependencies]\nserde = \"1\"\n")
            .unwrap();
        let keys: Vec<_> = result.nodes.iter().map(|n| n.qualified_name.as_str()).collect();
        assert_eq!(keys, vec!["dependencies", "package"]);
    }

    #[test]
    fn yaml_keys() {
        let analyzer = ConfigAnalyzer {
            language: Language::Yaml,
        };
        let result = analyzer
            .extract("ci.yml", b"jobs:\n  build: {}\non: push\n")
            .unwrap();
        assert!(result.nodes.iter().any(|n| n.qualified_name == "jobs"));
    }

    #[test]
    fn broken_config_yields_diagnostic_not_error() {
        let analyzer = ConfigAnalyzer {
            language: Language::Json,
        };
        let result = analyzer.extract("bad.json", b"{not json").unwrap();
        assert!(result.nodes.is_empty());
        assert_eq!(result.diagnostics.len(), 1);
    }
}
