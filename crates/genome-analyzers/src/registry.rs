//! Analyzer registry
//!
//! Built-in analyzers are a tagged variant (no string dispatch); external
//! ones slot in behind the same capability.

use std::collections::HashMap;
use std::sync::Arc;

use genome_core::Language;

use crate::classify::{Capability, FileProfile};
use crate::extractor::{Analyzer, ExtractionResult};
use crate::languages::{
    config::ConfigAnalyzer, generic::GenericAnalyzer, go::GoAnalyzer, java::JavaAnalyzer,
    javascript::JavaScriptAnalyzer, python::PythonAnalyzer, rust::RustAnalyzer,
    typescript::TypeScriptAnalyzer,
};

pub enum BuiltinAnalyzer {
    Python(PythonAnalyzer),
    Rust(RustAnalyzer),
    TypeScript(TypeScriptAnalyzer),
    JavaScript(JavaScriptAnalyzer),
    Go(GoAnalyzer),
    Java(JavaAnalyzer),
    Config(ConfigAnalyzer),
    Generic(GenericAnalyzer),
    External(Arc<dyn Analyzer>),
}

impl Analyzer for BuiltinAnalyzer {
    fn extract(&self, path: &str, content: &[u8]) -> anyhow::Result<ExtractionResult> {
        match self {
            BuiltinAnalyzer::Python(a) => a.extract(path, content),
            BuiltinAnalyzer::Rust(a) => a.extract(path, content),
            BuiltinAnalyzer::TypeScript(a) => a.extract(path, content),
            BuiltinAnalyzer::JavaScript(a) => a.extract(path, content),
            BuiltinAnalyzer::Go(a) => a.extract(path, content),
            BuiltinAnalyzer::Java(a) => a.extract(path, content),
            BuiltinAnalyzer::Config(a) => a.extract(path, content),
            BuiltinAnalyzer::Generic(a) => a.extract(path, content),
            BuiltinAnalyzer::External(a) => a.extract(path, content),
        }
    }
}

pub struct AnalyzerRegistry {
    analyzers: HashMap<Capability, BuiltinAnalyzer>,
}

impl AnalyzerRegistry {
    pub fn with_builtins() -> Self {
        let mut analyzers = HashMap::new();
        analyzers.insert(Capability::Python, BuiltinAnalyzer::Python(PythonAnalyzer));
        analyzers.insert(Capability::Rust, BuiltinAnalyzer::Rust(RustAnalyzer));
        analyzers.insert(
            Capability::TypeScript,
            BuiltinAnalyzer::TypeScript(TypeScriptAnalyzer),
        );
        analyzers.insert(
            Capability::JavaScript,
            BuiltinAnalyzer::JavaScript(JavaScriptAnalyzer),
        );
        analyzers.insert(Capability::Go, BuiltinAnalyzer::Go(GoAnalyzer));
        analyzers.insert(Capability::Java, BuiltinAnalyzer::Java(JavaAnalyzer));
        // The config analyzer reads its concrete syntax from the profile at
        // dispatch time; register a placeholder with a default language.
        analyzers.insert(
            Capability::Config,
            BuiltinAnalyzer::Config(ConfigAnalyzer {
                language: Language::Yaml,
            }),
        );
        analyzers.insert(Capability::Generic, BuiltinAnalyzer::Generic(GenericAnalyzer));
        AnalyzerRegistry { analyzers }
    }

    /// Replace or add an analyzer for a capability slot.
    pub fn register_external(&mut self, capability: Capability, analyzer: Arc<dyn Analyzer>) {
        self.analyzers
            .insert(capability, BuiltinAnalyzer::External(analyzer));
    }

    /// Run the analyzer matching the file's profile. `None` when the file
    /// has no capability (kind `other`, docs, web assets).
    pub fn extract(
        &self,
        profile: &FileProfile,
        path: &str,
        content: &[u8],
    ) -> Option<anyhow::Result<ExtractionResult>> {
        let capability = profile.capability?;
        // Config dispatch carries the concrete language.
        if capability == Capability::Config {
            if let Some(BuiltinAnalyzer::Config(_)) = self.analyzers.get(&capability) {
                let analyzer = ConfigAnalyzer {
                    language: profile.language.unwrap_or(Language::Yaml),
                };
                return Some(analyzer.extract(path, content));
            }
        }
        let analyzer = self.analyzers.get(&capability)?;
        Some(analyzer.extract(path, content))
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
