//! Summary derivation
//!
//! The summary is always computed from the genome itself after a merge,
//! never supplied externally.

use globset::{Glob, GlobSetBuilder};

use crate::config::EngineConfig;
use crate::genome::Genome;
use crate::graph::GraphIndex;
use crate::model::{NodeId, NodeType, Score};

/// Architectural style tags inferred from structural patterns. Closed set.
const STYLE_API_FIRST: &str = "api-first";
const STYLE_CLI: &str = "cli";
const STYLE_LAYERED: &str = "layered";
const STYLE_TEST_HEAVY: &str = "test-heavy";
const STYLE_CONFIG_DRIVEN: &str = "config-driven";

pub fn derive(genome: &mut Genome, config: &EngineConfig) {
    let mut entry_points: Vec<NodeId> = genome
        .nodes
        .values()
        .filter(|n| n.entry_point)
        .map(|n| n.id.clone())
        .collect();
    entry_points.sort();

    // Top concepts by member count.
    let mut domains: Vec<(usize, String)> = genome
        .concepts
        .iter()
        .map(|c| (c.nodes.len(), c.description.clone()))
        .collect();
    domains.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    let core_domains: Vec<String> = domains.into_iter().take(5).map(|(_, d)| d).collect();

    // Top-k files by churn.
    let mut by_churn: Vec<(&NodeId, f32)> = genome
        .history
        .iter()
        .map(|(id, entry)| (id, entry.churn_score.value()))
        .collect();
    by_churn.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    let hotspots: Vec<NodeId> = by_churn
        .iter()
        .take(config.hotspot_count)
        .filter(|(_, churn)| *churn > 0.0)
        .map(|(id, _)| (*id).clone())
        .collect();

    // Legacy patterns plus hot files with high criticality.
    let mut legacy = GlobSetBuilder::new();
    for pattern in &config.legacy_patterns {
        if let Ok(glob) = Glob::new(pattern) {
            legacy.add(glob);
        }
    }
    let legacy = legacy.build().ok();
    let mut do_not_touch: Vec<NodeId> = genome
        .nodes
        .values()
        .filter(|n| {
            let matches_legacy = legacy
                .as_ref()
                .zip(n.file.as_ref())
                .map(|(set, file)| set.is_match(file))
                .unwrap_or(false);
            let hot_and_critical =
                hotspots.contains(&n.id) && n.criticality.value() > 0.8;
            matches_legacy || hot_and_critical
        })
        .map(|n| n.id.clone())
        .collect();
    do_not_touch.sort();
    do_not_touch.dedup();

    let architectural_style = infer_style(genome);

    genome.summary.entry_points = entry_points;
    genome.summary.core_domains = core_domains;
    genome.summary.hotspots = hotspots;
    genome.summary.do_not_touch = do_not_touch;
    genome.summary.architectural_style = architectural_style;
    genome.refresh_counts();
}

fn infer_style(genome: &Genome) -> Vec<String> {
    let mut styles = Vec::new();

    let resource_nodes = genome
        .nodes
        .values()
        .filter(|n| n.node_type == NodeType::Resource)
        .count();
    if resource_nodes > 0 {
        styles.push(STYLE_API_FIRST.to_string());
    }

    if genome.nodes.values().any(|n| n.entry_point) {
        styles.push(STYLE_CLI.to_string());
    }

    // Three or more top-level directories with code implies layering.
    let top_dirs: std::collections::BTreeSet<&str> = genome
        .nodes
        .values()
        .filter_map(|n| n.file.as_deref())
        .filter_map(|f| f.split_once('/').map(|(dir, _)| dir))
        .collect();
    if top_dirs.len() >= 3 {
        styles.push(STYLE_LAYERED.to_string());
    }

    let test_nodes = genome
        .nodes
        .values()
        .filter(|n| n.node_type == NodeType::Test)
        .count();
    let function_nodes = genome
        .nodes
        .values()
        .filter(|n| n.node_type == NodeType::Function)
        .count();
    if function_nodes > 0 && test_nodes * 2 >= function_nodes {
        styles.push(STYLE_TEST_HEAVY.to_string());
    }

    let config_nodes = genome
        .nodes
        .values()
        .filter(|n| n.node_type == NodeType::Config)
        .count();
    if config_nodes >= 5 {
        styles.push(STYLE_CONFIG_DRIVEN.to_string());
    }

    styles
}

/// Criticality from normalized structural fan-in, with a fixed lift for
/// entry points. Pure function of the graph, bounded to [0, 1].
pub fn assign_criticality(genome: &mut Genome) {
    let index = GraphIndex::from_genome(genome);
    let fan_ins: std::collections::BTreeMap<NodeId, usize> = genome
        .nodes
        .keys()
        .map(|id| (id.clone(), index.fan_in(id)))
        .collect();
    let max_fan_in = fan_ins.values().copied().max().unwrap_or(0).max(1) as f32;
    for (id, node) in genome.nodes.iter_mut() {
        let base = fan_ins.get(id).copied().unwrap_or(0) as f32 / max_fan_in;
        let lifted = if node.entry_point { base + 0.3 } else { base };
        node.criticality = Score::new(lifted);
    }
}
