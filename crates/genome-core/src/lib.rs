//! Genome core — data model, graph index, merger, delta, serialization

pub mod cancel;
pub mod capabilities;
pub mod config;
pub mod delta;
pub mod encode;
pub mod error;
pub mod export;
pub mod genome;
pub mod graph;
pub mod merge;
pub mod model;
pub mod summary;
pub mod validate;

pub use cancel::CancelToken;
pub use capabilities::{
    Clock, FileActivity, FilesystemSource, FixedClock, HistorySource, MtimeHistory, StaticHistory,
    SystemClock,
};
pub use config::{EngineConfig, SubsystemToggles};
pub use delta::{GenomeDelta, SectionPatches};
pub use encode::{ARTIFACT_NAME, ARTIFACT_NAME_GZ};
pub use error::{Diagnostic, GenomeError, Result, Severity};
pub use genome::{base_graph_of, BaseGraph, Genome};
pub use graph::{GraphIndex, TraversalDirection};
pub use merge::{Merger, SubsystemOutputs};
pub use model::{
    Concept, ContractEntry, Edge, EdgeKey, EdgeType, EncodeMode, Flow, HistoryEntry, Language,
    Metadata, Node, NodeId, NodeType, RiskEntry, Score, SideEffect, Summary, SummaryCounts,
    Visibility, SCHEMA_VERSION,
};
pub use validate::Violation;
