//! Query engine and context assembler

pub mod cache;
pub mod context;
pub mod filter;
pub mod nlq;
pub mod query;

pub use cache::ResultCache;
pub use context::{
    ContextAssembler, ContextItem, ContextRequest, ContextResult, ContextTrace, FeedbackCounters,
    Skeleton,
};
pub use filter::{CmpOp, Predicate};
pub use query::{
    compare, dependencies, find_path, get_node, project, query, stats, NodeOptions, PageResult,
    QueryOptions, PATH_EDGE_TYPES,
};
