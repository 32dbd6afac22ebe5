//! Capability interfaces the engine consumes
//!
//! Version-control introspection and filesystem watching stay outside the
//! engine; these traits are the whole surface it sees.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::error::Result;

/// Enumerates candidate paths and reads their bytes.
pub trait FilesystemSource: Send + Sync {
    /// Repo-relative POSIX paths of every included file.
    fn enumerate(&self) -> Result<Vec<String>>;
    fn read(&self, rel_path: &str) -> Result<Vec<u8>>;
}

/// Per-file change activity over an observation window.
#[derive(Debug, Clone, PartialEq)]
pub struct FileActivity {
    pub last_modified: DateTime<Utc>,
    /// Changes observed in the window; the history subsystem normalizes this
    /// into a churn score.
    pub change_count: u32,
}

/// Change-history provider, independent of any specific VCS.
pub trait HistorySource: Send + Sync {
    fn activity(&self, rel_path: &str) -> Option<FileActivity>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock for deterministic tests and reproducible artifacts.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Mtime-backed history: last-modified from file metadata, change frequency
/// approximated from age (recently touched files score as active).
pub struct MtimeHistory {
    root: PathBuf,
}

impl MtimeHistory {
    pub fn new(root: &Path) -> Self {
        MtimeHistory {
            root: root.to_path_buf(),
        }
    }
}

impl HistorySource for MtimeHistory {
    fn activity(&self, rel_path: &str) -> Option<FileActivity> {
        let meta = std::fs::metadata(self.root.join(rel_path)).ok()?;
        let modified = meta.modified().ok()?;
        let last_modified: DateTime<Utc> = modified.into();
        let age_days = SystemTime::now()
            .duration_since(modified)
            .map(|d| d.as_secs() / 86_400)
            .unwrap_or(u64::MAX);
        // 30-day window, one synthetic change per remaining day of recency.
        let change_count = 30u64.saturating_sub(age_days.min(30)) as u32;
        Some(FileActivity {
            last_modified,
            change_count,
        })
    }
}

/// In-memory history table for tests.
#[derive(Default)]
pub struct StaticHistory {
    entries: std::collections::BTreeMap<String, FileActivity>,
}

impl StaticHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, activity: FileActivity) -> Self {
        self.entries.insert(path.to_string(), activity);
        self
    }
}

impl HistorySource for StaticHistory {
    fn activity(&self, rel_path: &str) -> Option<FileActivity> {
        self.entries.get(rel_path).cloned()
    }
}
