//! Repository scanner
//!
//! Walks the tree, dispatches files to analyzers in parallel chunks,
//! normalizes ids, resolves imports and calls, and produces the base graph.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use genome_core::{
    BaseGraph, CancelToken, Diagnostic, Edge, EdgeType, EngineConfig, FilesystemSource,
    GenomeError, Language, Node, NodeId, NodeType, Result, Visibility,
};

use crate::classify::{classify, FileKind, FileProfile};
use crate::extractor::{Endpoint, ExtractionResult, Target};
use crate::registry::AnalyzerRegistry;

/// Per-file analysis output, before cross-file resolution.
#[derive(Debug, Clone)]
pub struct RawFileResult {
    pub path: String,
    pub profile: FileProfile,
    pub extraction: ExtractionResult,
    pub fingerprint: String,
}

/// Everything a full scan yields.
pub struct ScanOutcome {
    pub base: BaseGraph,
    pub diagnostics: Vec<Diagnostic>,
    pub fingerprints: BTreeMap<String, String>,
    pub repo_hash: String,
}

/// sha256 over path and content; stable across engine releases, which the
/// persisted fingerprint table requires.
pub fn fingerprint(path: &str, content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update([0u8]);
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Tree hash over the sorted fingerprint table.
pub fn repo_hash(fingerprints: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (path, fp) in fingerprints {
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(fp.as_bytes());
        hasher.update([b'\n']);
    }
    format!("{:x}", hasher.finalize())
}

/// Default `FilesystemSource`: walks the tree with the ignore crate
/// (honoring VCS metadata) plus the configured exclusion globs.
pub struct WalkSource {
    root: PathBuf,
    excludes: GlobSet,
}

impl WalkSource {
    pub fn new(root: &Path, ignore_patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in ignore_patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| GenomeError::invalid_input(format!("ignore pattern {pattern}: {e}")))?;
            builder.add(glob);
        }
        let excludes = builder
            .build()
            .map_err(|e| GenomeError::invalid_input(e.to_string()))?;
        Ok(WalkSource {
            root: root.to_path_buf(),
            excludes,
        })
    }
}

impl FilesystemSource for WalkSource {
    fn enumerate(&self) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        let walker = ignore::WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .git_exclude(true)
            .build();
        for entry in walker {
            let entry = entry.map_err(|e| GenomeError::invalid_input(e.to_string()))?;
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let rel = rel.to_string_lossy().replace('\\', "/");
            if self.excludes.is_match(&rel) {
                continue;
            }
            paths.push(rel);
        }
        paths.sort();
        Ok(paths)
    }

    fn read(&self, rel_path: &str) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.root.join(rel_path))?)
    }
}

pub struct RepoScanner {
    config: EngineConfig,
    registry: AnalyzerRegistry,
    source: Box<dyn FilesystemSource>,
}

impl RepoScanner {
    pub fn new(root: &Path, config: EngineConfig) -> Result<Self> {
        Self::with_registry(root, config, AnalyzerRegistry::with_builtins())
    }

    pub fn with_registry(
        root: &Path,
        config: EngineConfig,
        registry: AnalyzerRegistry,
    ) -> Result<Self> {
        let source = Box::new(WalkSource::new(root, &config.ignore)?);
        Ok(Self::with_source(config, registry, source))
    }

    pub fn with_source(
        config: EngineConfig,
        registry: AnalyzerRegistry,
        source: Box<dyn FilesystemSource>,
    ) -> Self {
        RepoScanner {
            config,
            registry,
            source,
        }
    }

    /// Sorted repo-relative paths of every included file.
    pub fn enumerate(&self) -> Result<Vec<String>> {
        self.source.enumerate()
    }

    /// Hash every included file without analyzing it. Drives incremental
    /// change detection.
    pub fn fingerprint_all(&self) -> Result<BTreeMap<String, String>> {
        let files = self.enumerate()?;
        let fingerprints: Vec<(String, String)> = files
            .par_iter()
            .filter_map(|path| {
                let content = self.source.read(path).ok()?;
                Some((path.clone(), fingerprint(path, &content)))
            })
            .collect();
        Ok(fingerprints.into_iter().collect())
    }

    /// Analyze the given files in parallel chunks. Analyzer and read
    /// failures become diagnostics; cancellation is checked per chunk.
    pub fn analyze_files(
        &self,
        files: &[String],
        token: &CancelToken,
    ) -> Result<(Vec<RawFileResult>, Vec<Diagnostic>)> {
        let chunk_size = (files.len() / (4 * self.config.workers.max(1))).max(1);
        let mut results = Vec::with_capacity(files.len());
        let mut diagnostics = Vec::new();

        for chunk in files.chunks(chunk_size) {
            token.check()?;
            let chunk_out: Vec<(Option<RawFileResult>, Vec<Diagnostic>)> = chunk
                .par_iter()
                .map(|path| self.analyze_one(path))
                .collect();
            for (result, diags) in chunk_out {
                results.extend(result);
                diagnostics.extend(diags);
            }
        }
        Ok((results, diagnostics))
    }

    fn analyze_one(&self, path: &str) -> (Option<RawFileResult>, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let content = match self.source.read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                diagnostics.push(Diagnostic::error(path, format!("read failed: {e}")));
                return (None, diagnostics);
            }
        };
        let profile = classify(path, Some(&content));
        if profile.kind == FileKind::Other {
            return (None, diagnostics);
        }
        let extraction = match self.registry.extract(&profile, path, &content) {
            Some(Ok(mut extraction)) => {
                diagnostics.append(&mut extraction.diagnostics);
                extraction
            }
            Some(Err(e)) => {
                diagnostics.push(Diagnostic::error(path, format!("analysis failed: {e}")));
                ExtractionResult::default()
            }
            None => ExtractionResult::default(),
        };
        let raw = RawFileResult {
            path: path.to_string(),
            fingerprint: fingerprint(path, &content),
            profile,
            extraction,
        };
        (Some(raw), diagnostics)
    }

    /// Full scan: enumerate, analyze, resolve.
    pub fn full_scan(&self, token: &CancelToken) -> Result<ScanOutcome> {
        let files = self.enumerate()?;
        tracing::info!(files = files.len(), "scanning repository");
        let (raw, diagnostics) = self.analyze_files(&files, token)?;
        token.check()?;

        let mut context = SymbolContext::new();
        for r in &raw {
            context.add_raw(r);
        }
        let base = resolve(&raw, &context);

        let fingerprints: BTreeMap<String, String> = raw
            .iter()
            .map(|r| (r.path.clone(), r.fingerprint.clone()))
            .collect();
        let repo_hash = repo_hash(&fingerprints);
        tracing::info!(
            nodes = base.nodes.len(),
            edges = base.edges.len(),
            "base graph built"
        );
        Ok(ScanOutcome {
            base,
            diagnostics,
            fingerprints,
            repo_hash,
        })
    }
}

/// Symbol table used during cross-file resolution. Covers both freshly
/// analyzed files and (for incremental runs) files carried over unchanged.
#[derive(Default)]
pub struct SymbolContext {
    files: BTreeSet<String>,
    /// file → sorted (qualified name, node id)
    symbols: BTreeMap<String, Vec<(String, NodeId)>>,
}

impl SymbolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_raw(&mut self, raw: &RawFileResult) {
        self.files.insert(raw.path.clone());
        let entry = self.symbols.entry(raw.path.clone()).or_default();
        for decl in &raw.extraction.nodes {
            entry.push((
                decl.qualified_name.clone(),
                NodeId::symbol(&raw.path, &decl.qualified_name),
            ));
        }
        entry.sort();
    }

    /// Register symbols carried over from an existing base graph.
    pub fn add_base(&mut self, base: &BaseGraph, skip_files: &BTreeSet<String>) {
        for node in base.nodes.values() {
            let Some(file) = &node.file else { continue };
            if skip_files.contains(file) {
                continue;
            }
            self.files.insert(file.clone());
            if node.id.as_str() == file {
                continue;
            }
            // Recover the qualified name from the id: strip the file stem.
            let stem = match file.rsplit_once('.') {
                Some((stem, _)) => stem,
                None => file.as_str(),
            };
            let qualified = node
                .id
                .as_str()
                .strip_prefix(stem)
                .and_then(|s| s.strip_prefix('.'))
                .unwrap_or(node.id.as_str())
                .to_string();
            self.symbols
                .entry(file.clone())
                .or_default()
                .push((qualified, node.id.clone()));
        }
        for list in self.symbols.values_mut() {
            list.sort();
            list.dedup();
        }
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.files.contains(path)
    }

    /// Exact qualified match first, then trailing-segment match in source
    /// order.
    fn lookup(&self, file: &str, name: &str) -> Option<NodeId> {
        let symbols = self.symbols.get(file)?;
        if let Some((_, id)) = symbols.iter().find(|(q, _)| q == name) {
            return Some(id.clone());
        }
        symbols
            .iter()
            .find(|(q, _)| q.rsplit('.').next() == Some(name))
            .map(|(_, id)| id.clone())
    }
}

/// Map an import source string to a repo file, per-language best effort.
/// `None` means external.
fn resolve_import(importing: &str, source: &str, language: Option<Language>, context: &SymbolContext) -> Option<String> {
    let dir = importing.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
    let join = |base: &str, rest: &str| -> String {
        if base.is_empty() {
            rest.to_string()
        } else {
            format!("{base}/{rest}")
        }
    };
    match language {
        Some(Language::Python) => {
            let as_path = source.replace('.', "/");
            let candidates = [
                join(dir, &format!("{as_path}.py")),
                join(dir, &format!("{as_path}/__init__.py")),
                format!("{as_path}.py"),
                format!("{as_path}/__init__.py"),
            ];
            candidates.into_iter().find(|c| context.has_file(c))
        }
        Some(Language::TypeScript) | Some(Language::JavaScript) => {
            if !source.starts_with('.') {
                return None;
            }
            let mut base = dir.to_string();
            let mut rest = source;
            while let Some(stripped) = rest.strip_prefix("../") {
                base = base.rsplit_once('/').map(|(d, _)| d.to_string()).unwrap_or_default();
                rest = stripped;
            }
            let rest = rest.trim_start_matches("./");
            let stem = join(&base, rest);
            let candidates = [
                format!("{stem}.ts"),
                format!("{stem}.tsx"),
                format!("{stem}.js"),
                format!("{stem}.jsx"),
                format!("{stem}/index.ts"),
                format!("{stem}/index.js"),
            ];
            candidates.into_iter().find(|c| context.has_file(c))
        }
        Some(Language::Rust) => {
            let segments: Vec<&str> = source.split("::").collect();
            match segments.first() {
                Some(&"self") | Some(&"super") | Some(&"crate") => {
                    let name = segments.get(1)?;
                    let candidates = [
                        join(dir, &format!("{name}.rs")),
                        join(dir, &format!("{name}/mod.rs")),
                        format!("src/{name}.rs"),
                        format!("src/{name}/mod.rs"),
                    ];
                    candidates.into_iter().find(|c| context.has_file(c))
                }
                _ => None,
            }
        }
        Some(Language::Go) => {
            // Packages resolve to directories; try progressively shorter
            // path suffixes and pick the first .go file inside.
            let segments: Vec<&str> = source.split('/').collect();
            for start in 0..segments.len() {
                let suffix = segments[start..].join("/");
                let prefix = format!("{suffix}/");
                if let Some(file) = context
                    .files
                    .iter()
                    .find(|f| f.starts_with(&prefix) && f.ends_with(".go"))
                {
                    return Some(file.clone());
                }
            }
            None
        }
        Some(Language::Java) => {
            let as_path = format!("{}.java", source.replace('.', "/"));
            if context.has_file(&as_path) {
                return Some(as_path);
            }
            context
                .files
                .iter()
                .find(|f| f.ends_with(&format!("/{as_path}")))
                .cloned()
        }
        // Includes and sourced scripts are plain relative paths.
        Some(Language::C) | Some(Language::Cpp) | Some(Language::Shell) => {
            let candidates = [join(dir, source), source.to_string()];
            candidates.into_iter().find(|c| context.has_file(c))
        }
        _ => None,
    }
}

/// External resolver key for an unresolved import.
fn external_key(source: &str, language: Option<Language>) -> String {
    match language {
        Some(Language::Python) | Some(Language::Java) => source
            .split('.')
            .next()
            .unwrap_or(source)
            .to_string(),
        Some(Language::Rust) => source.split("::").next().unwrap_or(source).to_string(),
        Some(Language::TypeScript) | Some(Language::JavaScript) => {
            if source.starts_with('@') {
                source.splitn(3, '/').take(2).collect::<Vec<_>>().join("/")
            } else {
                source.split('/').next().unwrap_or(source).to_string()
            }
        }
        _ => source.to_string(),
    }
}

fn file_node_type(kind: FileKind) -> NodeType {
    match kind {
        FileKind::Config => NodeType::Config,
        FileKind::Web | FileKind::Data => NodeType::Resource,
        _ => NodeType::File,
    }
}

/// Cross-file resolution: build the base graph from raw per-file results.
pub fn resolve(raw: &[RawFileResult], context: &SymbolContext) -> BaseGraph {
    let mut base = BaseGraph::new();

    for r in raw {
        let file_id = NodeId::file(&r.path);
        let mut file_node = Node::new(file_id.clone(), file_node_type(r.profile.kind));
        file_node.file = Some(r.path.clone());
        file_node.language = r.profile.language;
        file_node.entry_point = r.extraction.file_entry;
        base.add_node(file_node);

        for decl in &r.extraction.nodes {
            let id = NodeId::symbol(&r.path, &decl.qualified_name);
            let mut node = Node::new(id.clone(), decl.node_type);
            node.file = Some(r.path.clone());
            node.language = r.profile.language;
            node.visibility = decl.visibility;
            node.summary = decl.summary.clone();
            node.entry_point = decl.entry_point;
            if decl.line_start > 0 {
                node.line_start = Some(decl.line_start);
                node.line_end = Some(decl.line_end);
            }
            base.add_node(node);
            base.add_edge(Edge::new(file_id.clone(), id, EdgeType::Defines));
        }
    }

    for r in raw {
        let file_id = NodeId::file(&r.path);
        // alias → resolved target file (None when external)
        let mut aliases: BTreeMap<String, Option<String>> = BTreeMap::new();

        for edge in &r.extraction.edges {
            match &edge.to {
                Target::Import(source) => {
                    let resolved = resolve_import(&r.path, source, r.profile.language, context);
                    let target = match &resolved {
                        Some(file) => NodeId::file(file),
                        None => {
                            let key = external_key(source, r.profile.language);
                            let ext = NodeId::external(&key);
                            if base.node(&ext).is_none() {
                                let mut node = Node::new(ext.clone(), NodeType::Module);
                                node.visibility = Visibility::Public;
                                base.add_node(node);
                            }
                            ext
                        }
                    };
                    let mut import_edge = Edge::new(file_id.clone(), target, EdgeType::Imports);
                    import_edge.line = edge.line;
                    base.add_edge(import_edge);

                    for alias in [
                        source.as_str(),
                        source.rsplit(['.', '/', ':']).next().unwrap_or(source),
                        source.split(['.', '/', ':']).next().unwrap_or(source),
                    ] {
                        if !alias.is_empty() {
                            aliases
                                .entry(alias.to_string())
                                .or_insert_with(|| resolved.clone());
                        }
                    }
                }
                Target::Local(name) | Target::Call(name) => {
                    let from = match &edge.from {
                        Endpoint::File => file_id.clone(),
                        Endpoint::Symbol(q) => NodeId::symbol(&r.path, q),
                    };
                    if let Some(to) = resolve_callee(name, &r.path, &aliases, context) {
                        if to != from {
                            let mut call_edge = Edge::new(from, to, edge.edge_type);
                            call_edge.line = edge.line;
                            base.add_edge(call_edge);
                        }
                    }
                }
            }
        }
    }
    base
}

fn resolve_callee(
    callee: &str,
    file: &str,
    aliases: &BTreeMap<String, Option<String>>,
    context: &SymbolContext,
) -> Option<NodeId> {
    // Same-file symbol, by exact qualified name or trailing segment.
    if !callee.contains('.') {
        if let Some(id) = context.lookup(file, callee) {
            return Some(id);
        }
        // Unqualified name pulled in with `from x import y` style imports.
        for target in aliases.values().flatten() {
            if let Some(id) = context.lookup(target, callee) {
                return Some(id);
            }
        }
        return None;
    }

    let (head, rest) = callee.split_once('.').unwrap_or((callee, ""));
    if head == "self" || head == "this" {
        let name = callee.rsplit('.').next().unwrap_or(callee);
        return context.lookup(file, name);
    }
    match aliases.get(head) {
        Some(Some(target_file)) => {
            // `b.greet()` → symbol `greet` in the file `b` resolved to.
            context
                .lookup(target_file, rest)
                .or_else(|| context.lookup(target_file, rest.rsplit('.').next().unwrap_or(rest)))
        }
        Some(None) => None, // external module; call edges stop at the import
        None => {
            // Dotted local call (`Class.method()`), or a qualifier we never
            // saw an import for.
            context.lookup(file, callee)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn scan(root: &Path) -> ScanOutcome {
        let scanner = RepoScanner::new(root, EngineConfig::default()).unwrap();
        scanner.full_scan(&CancelToken::unbounded()).unwrap()
    }

    #[test]
    fn single_file_python_repo() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "main.py",
            "def hello():\n    pass\n\nif __name__ == \"__main__\":\n    hello()\n",
        );
        let outcome = scan(dir.path());
        let base = &outcome.base;

        assert!(base.nodes.contains_key(&NodeId::from("main.py")));
        assert!(base.nodes.contains_key(&NodeId::from("main.hello")));
        assert!(base
            .edges
            .contains_key(&Edge::new("main.py".into(), "main.hello".into(), EdgeType::Defines).key()));
        assert!(base
            .edges
            .contains_key(&Edge::new("main.py".into(), "main.hello".into(), EdgeType::Calls).key()));
        assert!(base.node(&"main.py".into()).unwrap().entry_point);
    }

    #[test]
    fn two_file_import_and_cross_call() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "import b\nb.greet()\n");
        write(dir.path(), "b.py", "def greet():\n    pass\n");
        let outcome = scan(dir.path());
        let base = &outcome.base;

        assert!(base
            .edges
            .contains_key(&Edge::new("a.py".into(), "b.py".into(), EdgeType::Imports).key()));
        assert!(base
            .edges
            .contains_key(&Edge::new("a.py".into(), "b.greet".into(), EdgeType::Calls).key()));
    }

    #[test]
    fn unresolved_import_becomes_external_module() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "import requests\n");
        let outcome = scan(dir.path());
        let ext = NodeId::external("requests");
        let node = outcome.base.node(&ext).unwrap();
        assert_eq!(node.node_type, NodeType::Module);
        assert_eq!(node.visibility, Visibility::Public);
        assert!(node.file.is_none());
        assert!(outcome
            .base
            .edges
            .contains_key(&Edge::new("a.py".into(), ext, EdgeType::Imports).key()));
    }

    #[test]
    fn fingerprints_are_stable_and_content_sensitive() {
        let a = fingerprint("a.py", b"x = 1");
        let b = fingerprint("a.py", b"x = 1");
        let c = fingerprint("a.py", b"x = 2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn excluded_patterns_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "x = 1\n");
        write(dir.path(), "node_modules/lib/index.js", "module.exports = 1\n");
        let scanner = RepoScanner::new(dir.path(), EngineConfig::default()).unwrap();
        let files = scanner.enumerate().unwrap();
        assert_eq!(files, vec!["a.py".to_string()]);
    }

    #[test]
    fn config_files_produce_config_nodes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "app.toml", "[server]\nport = 1\n");
        let outcome = scan(dir.path());
        let file = outcome.base.node(&"app.toml".into()).unwrap();
        assert_eq!(file.node_type, NodeType::Config);
        assert!(outcome.base.nodes.contains_key(&NodeId::from("app.server")));
    }

    #[test]
    fn cancellation_aborts_scan() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "x = 1\n");
        let scanner = RepoScanner::new(dir.path(), EngineConfig::default()).unwrap();
        let token = CancelToken::unbounded();
        token.cancel();
        assert!(matches!(
            scanner.full_scan(&token),
            Err(GenomeError::Cancelled)
        ));
    }

    #[test]
    fn rust_module_imports_resolve_to_sibling_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/lib.rs", "mod auth;\n");
        write(dir.path(), "src/auth.rs", "pub fn login() {}\n");
        let outcome = scan(dir.path());
        assert!(outcome
            .base
            .edges
            .contains_key(&Edge::new("src/lib.rs".into(), "src/auth.rs".into(), EdgeType::Imports).key()));
    }
}
