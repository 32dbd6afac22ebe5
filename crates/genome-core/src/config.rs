//! Engine configuration
//!
//! Loaded from an optional `repogenome.toml` at the repo root; every field
//! has a compiled-in default.

use serde::{Deserialize, Serialize};

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_ignore() -> Vec<String> {
    vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/target/**".to_string(),
        "**/__pycache__/**".to_string(),
        "**/.venv/**".to_string(),
        "**/dist/**".to_string(),
        "**/build/**".to_string(),
    ]
}

fn default_page_size() -> usize {
    50
}

fn default_page_size_cap() -> usize {
    500
}

fn default_summary_len() -> usize {
    280
}

fn default_depth_cap() -> usize {
    16
}

fn default_hotspot_count() -> usize {
    10
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_entries() -> usize {
    256
}

fn default_flow_limit() -> usize {
    100
}

fn default_true() -> bool {
    true
}

/// Per-subsystem enable switches. Disabling a subsystem omits its section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubsystemToggles {
    #[serde(default = "default_true")]
    pub flows: bool,
    #[serde(default = "default_true")]
    pub concepts: bool,
    #[serde(default = "default_true")]
    pub history: bool,
    #[serde(default = "default_true")]
    pub contracts: bool,
    #[serde(default = "default_true")]
    pub test_links: bool,
    #[serde(default = "default_true")]
    pub risk: bool,
}

impl Default for SubsystemToggles {
    fn default() -> Self {
        SubsystemToggles {
            flows: true,
            concepts: true,
            history: true,
            contracts: true,
            test_links: true,
            risk: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Glob patterns excluded from the walk, on top of VCS metadata.
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
    /// Glob patterns for legacy code surfaced under `summary.do_not_touch`.
    #[serde(default)]
    pub legacy_patterns: Vec<String>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_page_size_cap")]
    pub page_size_cap: usize,
    #[serde(default = "default_summary_len")]
    pub max_summary_length: usize,
    #[serde(default = "default_depth_cap")]
    pub depth_cap: usize,
    #[serde(default = "default_hotspot_count")]
    pub hotspot_count: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_entries")]
    pub cache_entries: usize,
    #[serde(default = "default_flow_limit")]
    pub flow_limit: usize,
    #[serde(default)]
    pub subsystems: SubsystemToggles,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            ignore: default_ignore(),
            legacy_patterns: Vec::new(),
            workers: default_workers(),
            page_size: default_page_size(),
            page_size_cap: default_page_size_cap(),
            max_summary_length: default_summary_len(),
            depth_cap: default_depth_cap(),
            hotspot_count: default_hotspot_count(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_entries: default_cache_entries(),
            flow_limit: default_flow_limit(),
            subsystems: SubsystemToggles::default(),
        }
    }
}

impl EngineConfig {
    /// Read `repogenome.toml` from the repo root if present.
    pub fn load(root: &std::path::Path) -> crate::error::Result<Self> {
        let path = root.join("repogenome.toml");
        if !path.exists() {
            return Ok(EngineConfig::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        toml::from_str(&raw).map_err(|e| {
            crate::error::GenomeError::invalid_input(format!("repogenome.toml: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.page_size, 50);
        assert!(cfg.page_size_cap >= cfg.page_size);
        assert!(cfg.subsystems.flows);
        assert!(cfg.ignore.iter().any(|p| p.contains(".git")));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: EngineConfig = toml::from_str("workers = 2\n[subsystems]\nflows = false\n").unwrap();
        assert_eq!(cfg.workers, 2);
        assert!(!cfg.subsystems.flows);
        assert!(cfg.subsystems.history);
        assert_eq!(cfg.page_size, 50);
    }
}
