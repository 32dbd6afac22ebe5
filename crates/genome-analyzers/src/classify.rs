//! File classification: path → (language, kind, analyzer capability)
//!
//! Pure and total. Resolution order: extension, then shebang/first-line
//! heuristic, then content sniff. Unknown files classify as `other` with no
//! capability.

use genome_core::Language;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Code,
    Doc,
    Config,
    Web,
    Data,
    Other,
}

/// Which built-in analyzer handles a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Python,
    Rust,
    TypeScript,
    JavaScript,
    Go,
    Java,
    Config,
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileProfile {
    pub language: Option<Language>,
    pub kind: FileKind,
    pub capability: Option<Capability>,
}

impl FileProfile {
    const fn new(language: Option<Language>, kind: FileKind, capability: Option<Capability>) -> Self {
        FileProfile {
            language,
            kind,
            capability,
        }
    }
}

fn by_extension(path: &str) -> Option<FileProfile> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let ext = name.rsplit_once('.').map(|(_, e)| e)?;
    let profile = match ext {
        "py" | "pyi" => FileProfile::new(Some(Language::Python), FileKind::Code, Some(Capability::Python)),
        "rs" => FileProfile::new(Some(Language::Rust), FileKind::Code, Some(Capability::Rust)),
        "ts" | "tsx" => FileProfile::new(
            Some(Language::TypeScript),
            FileKind::Code,
            Some(Capability::TypeScript),
        ),
        "js" | "jsx" | "mjs" | "cjs" => FileProfile::new(
            Some(Language::JavaScript),
            FileKind::Code,
            Some(Capability::JavaScript),
        ),
        "go" => FileProfile::new(Some(Language::Go), FileKind::Code, Some(Capability::Go)),
        "java" => FileProfile::new(Some(Language::Java), FileKind::Code, Some(Capability::Java)),
        "c" | "h" => FileProfile::new(Some(Language::C), FileKind::Code, Some(Capability::Generic)),
        "cpp" | "cc" | "cxx" | "hpp" | "hh" => {
            FileProfile::new(Some(Language::Cpp), FileKind::Code, Some(Capability::Generic))
        }
        "sh" | "bash" => FileProfile::new(Some(Language::Shell), FileKind::Code, Some(Capability::Generic)),
        "yml" | "yaml" => FileProfile::new(Some(Language::Yaml), FileKind::Config, Some(Capability::Config)),
        "toml" => FileProfile::new(Some(Language::Toml), FileKind::Config, Some(Capability::Config)),
        "json" | "jsonc" => FileProfile::new(Some(Language::Json), FileKind::Config, Some(Capability::Config)),
        "md" | "mdx" | "rst" | "txt" => FileProfile::new(Some(Language::Markdown), FileKind::Doc, None),
        "html" | "htm" => FileProfile::new(Some(Language::Html), FileKind::Web, None),
        "css" | "scss" | "less" => FileProfile::new(Some(Language::Css), FileKind::Web, None),
        "sql" => FileProfile::new(Some(Language::Sql), FileKind::Data, Some(Capability::Generic)),
        "csv" | "tsv" | "parquet" => FileProfile::new(None, FileKind::Data, None),
        _ => return None,
    };
    Some(profile)
}

fn by_filename(path: &str) -> Option<FileProfile> {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name {
        "Dockerfile" => Some(FileProfile::new(None, FileKind::Config, None)),
        "Makefile" => Some(FileProfile::new(None, FileKind::Config, None)),
        _ if name.starts_with("Dockerfile.") => Some(FileProfile::new(None, FileKind::Config, None)),
        _ => None,
    }
}

fn by_shebang(content: &[u8]) -> Option<FileProfile> {
    let first_line = content.split(|&b| b == b'\n').next()?;
    let line = std::str::from_utf8(first_line).ok()?;
    if !line.starts_with("#!") {
        return None;
    }
    if line.contains("python") {
        return Some(FileProfile::new(
            Some(Language::Python),
            FileKind::Code,
            Some(Capability::Python),
        ));
    }
    if line.contains("node") {
        return Some(FileProfile::new(
            Some(Language::JavaScript),
            FileKind::Code,
            Some(Capability::JavaScript),
        ));
    }
    if line.contains("sh") {
        return Some(FileProfile::new(
            Some(Language::Shell),
            FileKind::Code,
            Some(Capability::Generic),
        ));
    }
    None
}

fn sniff(content: &[u8]) -> Option<FileProfile> {
    let head = &content[..content.len().min(256)];
    let text = std::str::from_utf8(head).ok()?;
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Some(FileProfile::new(
            Some(Language::Json),
            FileKind::Config,
            Some(Capability::Config),
        ));
    }
    if trimmed.starts_with('<') {
        return Some(FileProfile::new(Some(Language::Html), FileKind::Web, None));
    }
    None
}

/// Classify a repo-relative path, optionally consulting the leading bytes.
pub fn classify(path: &str, content: Option<&[u8]>) -> FileProfile {
    if let Some(profile) = by_extension(path).or_else(|| by_filename(path)) {
        return profile;
    }
    if let Some(bytes) = content {
        if let Some(profile) = by_shebang(bytes).or_else(|| sniff(bytes)) {
            return profile;
        }
    }
    FileProfile::new(None, FileKind::Other, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_extension() {
        let p = classify("src/main.py", None);
        assert_eq!(p.language, Some(Language::Python));
        assert_eq!(p.kind, FileKind::Code);
        assert_eq!(p.capability, Some(Capability::Python));
    }

    #[test]
    fn config_files_get_config_kind() {
        assert_eq!(classify("Cargo.toml", None).kind, FileKind::Config);
        assert_eq!(classify("deploy/app.yaml", None).kind, FileKind::Config);
        assert_eq!(classify("Dockerfile", None).kind, FileKind::Config);
    }

    #[test]
    fn shebang_beats_unknown_extension() {
        let p = classify("scripts/deploy", Some(b"#!/usr/bin/env python3\nprint()"));
        assert_eq!(p.language, Some(Language::Python));
        assert_eq!(p.capability, Some(Capability::Python));
    }

    #[test]
    fn unknown_is_other_with_no_capability() {
        let p = classify("data.bin", Some(&[0u8, 1, 2]));
        assert_eq!(p.kind, FileKind::Other);
        assert!(p.capability.is_none());
    }

    #[test]
    fn json_sniff() {
        let p = classify("noext", Some(b"{\"a\": 1}"));
        assert_eq!(p.kind, FileKind::Config);
    }
}
