//! File classification, analyzer registry, and repository scanning

pub mod classify;
pub mod extractor;
pub mod languages;
pub mod registry;
pub mod scan;

pub use classify::{classify, Capability, FileKind, FileProfile};
pub use extractor::{Analyzer, EdgeDecl, Endpoint, ExtractionResult, NodeDecl, Target};
pub use registry::{AnalyzerRegistry, BuiltinAnalyzer};
pub use scan::{
    fingerprint, repo_hash, resolve, RawFileResult, RepoScanner, ScanOutcome, SymbolContext,
    WalkSource,
};
