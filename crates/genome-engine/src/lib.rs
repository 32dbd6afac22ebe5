//! Scan coordination, incremental updates, and the snapshot store

pub mod coordinator;
pub mod snapshot;

pub use coordinator::{Engine, ScanStats};
pub use snapshot::SnapshotStore;

#[cfg(test)]
mod tests;
