//! Scan coordination
//!
//! Full scans rebuild everything; incremental scans re-analyze only the
//! affected file set (changed files plus their direct importers), re-run
//! the subsystems the change set demands, and publish atomically. A failed
//! merge leaves the prior genome untouched.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::Serialize;

use genome_analyzers::{resolve, RepoScanner, SymbolContext};
use genome_core::{
    base_graph_of, delta, encode, validate, BaseGraph, CancelToken, Clock, EdgeType, EncodeMode,
    EngineConfig, Genome, GenomeDelta, GenomeError, HistorySource, Merger, Metadata, MtimeHistory,
    Result, Severity, SubsystemOutputs, SystemClock, Violation,
};
use genome_subsystems::SubsystemMask;

use crate::snapshot::SnapshotStore;

#[derive(Debug, Clone, Serialize, Default)]
pub struct ScanStats {
    pub files: usize,
    pub nodes: usize,
    pub edges: usize,
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    pub partial: bool,
    pub incremental: bool,
    pub generation: u64,
}

pub struct Engine {
    root: PathBuf,
    config: EngineConfig,
    scanner: RepoScanner,
    store: SnapshotStore,
    history: Box<dyn HistorySource>,
    clock: Box<dyn Clock>,
    last_delta: RwLock<Option<GenomeDelta>>,
}

impl Engine {
    pub fn new(root: &Path) -> Result<Self> {
        let config = EngineConfig::load(root)?;
        Self::with_capabilities(
            root,
            config,
            Box::new(MtimeHistory::new(root)),
            Box::new(SystemClock),
        )
    }

    pub fn with_capabilities(
        root: &Path,
        config: EngineConfig,
        history: Box<dyn HistorySource>,
        clock: Box<dyn Clock>,
    ) -> Result<Self> {
        let scanner = RepoScanner::new(root, config.clone())?;
        Ok(Engine {
            root: root.to_path_buf(),
            config,
            scanner,
            store: SnapshotStore::new(),
            history,
            clock,
            last_delta: RwLock::new(None),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn snapshot(&self) -> Option<std::sync::Arc<Genome>> {
        self.store.snapshot()
    }

    pub fn generation(&self) -> u64 {
        self.store.generation()
    }

    /// Delta published by the most recent writer operation.
    pub fn last_delta(&self) -> Option<GenomeDelta> {
        self.last_delta.read().ok().and_then(|d| d.clone())
    }

    /// Load the persisted artifact from the repo root, if present.
    pub fn load_persisted(&self) -> Result<bool> {
        let Some(genome) = encode::load_from_repo(&self.root)? else {
            return Ok(false);
        };
        let _writer = self.store.writer_lock();
        self.store.publish(genome);
        Ok(true)
    }

    /// Validate the current genome against every invariant.
    pub fn validate(&self) -> Result<Vec<Violation>> {
        let snapshot = self
            .store
            .snapshot()
            .ok_or_else(|| GenomeError::not_found("no genome loaded; run scan first"))?;
        Ok(validate::check(&snapshot))
    }

    pub fn scan(&self, incremental: bool, token: &CancelToken) -> Result<ScanStats> {
        self.scan_with_hints(incremental, &[], token)
    }

    /// Run a scan. `hints` are client-reported changed paths folded into the
    /// affected set on the incremental path.
    pub fn scan_with_hints(
        &self,
        incremental: bool,
        hints: &[String],
        token: &CancelToken,
    ) -> Result<ScanStats> {
        let _writer = self.store.writer_lock();
        let prior = self.store.snapshot();
        match (incremental, prior) {
            (true, Some(prior)) => self.incremental_locked(&prior, hints, token),
            _ => self.full_locked(token),
        }
    }

    fn metadata(
        &self,
        repo_hash: String,
        fingerprints: std::collections::BTreeMap<String, String>,
        partial: bool,
    ) -> Metadata {
        let mut metadata = Metadata::new(self.clock.now());
        metadata.repo_hash = repo_hash;
        metadata.fingerprints = fingerprints;
        metadata.partial = partial;
        metadata
    }

    fn full_locked(&self, token: &CancelToken) -> Result<ScanStats> {
        let outcome = self.scanner.full_scan(token)?;
        let partial = outcome
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error);
        for diag in &outcome.diagnostics {
            tracing::warn!(file = %diag.file, "{}", diag.message);
        }

        let outputs = genome_subsystems::run(
            &outcome.base,
            &self.config,
            self.history.as_ref(),
            &SubsystemMask::all(),
        );
        token.check()?;

        let files = outcome.fingerprints.len();
        let metadata = self.metadata(outcome.repo_hash, outcome.fingerprints, partial);
        let genome = Merger::new(&self.config).merge(outcome.base, outputs, metadata)?;
        self.publish(genome, files, 0, 0, 0, partial, false)
    }

    fn incremental_locked(
        &self,
        prior: &Genome,
        hints: &[String],
        token: &CancelToken,
    ) -> Result<ScanStats> {
        let new_fingerprints = self.scanner.fingerprint_all()?;
        let old_fingerprints = &prior.metadata.fingerprints;

        let mut added = BTreeSet::new();
        let mut modified = BTreeSet::new();
        for (path, fp) in &new_fingerprints {
            match old_fingerprints.get(path) {
                None => {
                    added.insert(path.clone());
                }
                Some(old) if old != fp => {
                    modified.insert(path.clone());
                }
                Some(_) => {}
            }
        }
        let removed: BTreeSet<String> = old_fingerprints
            .keys()
            .filter(|p| !new_fingerprints.contains_key(*p))
            .cloned()
            .collect();

        for hint in hints {
            if new_fingerprints.contains_key(hint) {
                modified.insert(hint.clone());
            }
        }

        if added.is_empty() && modified.is_empty() && removed.is_empty() {
            tracing::debug!("no changes detected; genome left untouched");
            return Ok(ScanStats {
                files: new_fingerprints.len(),
                nodes: prior.node_count(),
                edges: prior.edge_count(),
                partial: prior.metadata.partial,
                incremental: true,
                generation: self.store.generation(),
                ..Default::default()
            });
        }
        tracing::info!(
            added = added.len(),
            modified = modified.len(),
            removed = removed.len(),
            "incremental change set"
        );

        let prior_base = base_graph_of(prior);

        // The affected set: changed files, their direct importers (cross-file
        // edges into changed files get recomputed), and importers of external
        // modules an added file may now satisfy.
        let mut affected: BTreeSet<String> = added.union(&modified).cloned().collect();
        let changed_or_removed: BTreeSet<String> =
            modified.union(&removed).cloned().collect();
        affected.extend(prior_base.importers_of(&changed_or_removed));
        affected.extend(self.ext_importers_for_added(&prior_base, &added));
        affected.retain(|f| new_fingerprints.contains_key(f));

        let affected_files: Vec<String> = affected.iter().cloned().collect();
        let (raw, diagnostics) = self.scanner.analyze_files(&affected_files, token)?;
        let partial = diagnostics.iter().any(|d| d.severity == Severity::Error);

        let mut context = SymbolContext::new();
        for r in &raw {
            context.add_raw(r);
        }
        let mut skip = affected.clone();
        skip.extend(removed.iter().cloned());
        context.add_base(&prior_base, &skip);
        // Unchanged files still participate in import resolution.
        let partial_base = resolve(&raw, &context);

        // Splice: drop nodes of changed files, land the fresh nodes, then
        // prune edges. Fresh nodes go in before the prune so edges from
        // unchanged files into re-analyzed files keep their anchor.
        let mut merged_base = prior_base.clone();
        merged_base
            .nodes
            .retain(|_, n| n.file.as_deref().map(|f| !skip.contains(f)).unwrap_or(true));
        for node in partial_base.nodes.into_values() {
            merged_base.add_node(node);
        }
        // Edges originating in re-analyzed files are recomputed below;
        // edges whose endpoint vanished with a deleted symbol go with it.
        let nodes = &merged_base.nodes;
        merged_base.edges.retain(|_, e| {
            let from_kept = nodes
                .get(&e.from)
                .and_then(|n| n.file.as_deref())
                .map(|f| !skip.contains(f))
                .unwrap_or(false);
            from_kept && (nodes.contains_key(&e.to) || e.to.is_virtual())
        });
        for edge in partial_base.edges.into_values() {
            merged_base.add_edge(edge);
        }
        token.check()?;

        let structural_changed =
            structural_edges(&prior_base) != structural_edges(&merged_base);
        let mask = SubsystemMask {
            flows: structural_changed,
            contracts: structural_changed,
            test_links: structural_changed,
            concepts: !added.is_empty() || !removed.is_empty(),
            history: true,
            risk: true,
        };
        let mut outputs = genome_subsystems::run(
            &merged_base,
            &self.config,
            self.history.as_ref(),
            &mask,
        );
        self.carry_forward(prior, &mask, &mut outputs);

        let files = new_fingerprints.len();
        let repo_hash = genome_analyzers::repo_hash(&new_fingerprints);
        let metadata = self.metadata(repo_hash, new_fingerprints, partial);
        let genome = Merger::new(&self.config).merge(merged_base, outputs, metadata)?;
        self.publish(
            genome,
            files,
            added.len(),
            modified.len(),
            removed.len(),
            partial,
            true,
        )
    }

    /// Files whose unresolved (external) imports may now resolve to a file
    /// added in this change set.
    fn ext_importers_for_added(
        &self,
        prior_base: &BaseGraph,
        added: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        let stems: BTreeSet<String> = added
            .iter()
            .filter_map(|p| {
                let name = p.rsplit('/').next()?;
                let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
                Some(stem.to_string())
            })
            .collect();
        let mut out = BTreeSet::new();
        for edge in prior_base.edges.values() {
            if edge.edge_type != EdgeType::Imports || !edge.to.as_str().starts_with("ext:") {
                continue;
            }
            let key = edge.to.as_str().trim_start_matches("ext:");
            let trailing = key.rsplit(['/', '.', ':']).next().unwrap_or(key);
            if stems.contains(trailing) {
                if let Some(src) = prior_base.nodes.get(&edge.from).and_then(|n| n.file.clone()) {
                    out.insert(src);
                }
            }
        }
        out
    }

    /// Sections whose subsystem was skipped keep their prior content.
    fn carry_forward(
        &self,
        prior: &Genome,
        mask: &SubsystemMask,
        outputs: &mut SubsystemOutputs,
    ) {
        let toggles = &self.config.subsystems;
        if toggles.flows && !mask.flows {
            outputs.flows = Some(prior.flows.clone());
        }
        if toggles.concepts && !mask.concepts {
            outputs.concepts = Some(prior.concepts.clone());
        }
        if toggles.history && !mask.history {
            outputs.history = Some(prior.history.clone());
        }
        if toggles.contracts && !mask.contracts {
            outputs.contracts = Some(prior.contracts.clone());
        }
        if toggles.risk && !mask.risk {
            outputs.risk = Some(prior.risk.clone());
        }
        if toggles.test_links && !mask.test_links {
            outputs.test_edges = Some(
                prior
                    .edges
                    .iter()
                    .filter(|e| e.edge_type == EdgeType::Tests)
                    .cloned()
                    .collect(),
            );
        }
    }

    fn publish(
        &self,
        genome: Genome,
        files: usize,
        added: usize,
        modified: usize,
        removed: usize,
        partial: bool,
        incremental: bool,
    ) -> Result<ScanStats> {
        let prior = self.store.snapshot();
        let delta = prior.as_ref().map(|p| delta::between(p, &genome));
        encode::save_to_repo(&genome, &self.root, EncodeMode::Standard, false)?;
        let nodes = genome.node_count();
        let edges = genome.edge_count();
        let generation = self.store.publish(genome);
        if let Ok(mut last) = self.last_delta.write() {
            *last = delta;
        }
        tracing::info!(generation, nodes, edges, "genome published");
        Ok(ScanStats {
            files,
            nodes,
            edges,
            added,
            modified,
            removed,
            partial,
            incremental,
            generation,
        })
    }

    /// Write an export projection next to the repo (or to an explicit path).
    pub fn export(
        &self,
        format: genome_core::export::ExportFormat,
        out: Option<&Path>,
    ) -> Result<(PathBuf, usize)> {
        use genome_core::export::{self, ExportFormat};
        let snapshot = self
            .store
            .snapshot()
            .ok_or_else(|| GenomeError::not_found("no genome loaded; run scan first"))?;
        let default_path = self
            .root
            .join(format!("repogenome.{}", format.extension()));
        let path = out.map(Path::to_path_buf).unwrap_or(default_path);
        let payload = match format {
            ExportFormat::Json => {
                String::from_utf8(encode::save(&snapshot, EncodeMode::Standard, false)?)
                    .map_err(|e| GenomeError::invalid_input(e.to_string()))?
            }
            ExportFormat::GraphMl => export::to_graphml(&snapshot),
            ExportFormat::Dot => export::to_dot(&snapshot),
            ExportFormat::Csv => {
                let (nodes, edges) = export::to_csv(&snapshot);
                format!("{nodes}\n{edges}")
            }
            ExportFormat::Cypher => export::to_cypher(&snapshot),
            ExportFormat::PlantUml => export::to_plantuml(&snapshot),
        };
        std::fs::write(&path, payload.as_bytes())?;
        Ok((path, payload.len()))
    }
}

fn structural_edges(base: &BaseGraph) -> BTreeSet<genome_core::EdgeKey> {
    base.edges
        .keys()
        .filter(|k| {
            matches!(
                k.edge_type,
                EdgeType::Defines | EdgeType::Imports | EdgeType::Calls
            )
        })
        .cloned()
        .collect()
}
