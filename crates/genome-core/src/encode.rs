//! Genome serialization: standard / compact / lite modes, optional gzip
//!
//! The loader auto-detects gzip by magic bytes and the mode by the
//! `metadata.mode` tag. Every mode round-trips losslessly within its field
//! set.

use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{Map, Value};

use crate::error::{GenomeError, Result};
use crate::genome::Genome;
use crate::model::{EncodeMode, SCHEMA_VERSION};

/// Default artifact name in the repo root.
pub const ARTIFACT_NAME: &str = "repogenome.json";
pub const ARTIFACT_NAME_GZ: &str = "repogenome.json.gz";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Normative short-alias table. Field-projection requests accept both forms.
pub const FIELD_ALIASES: &[(&str, &str)] = &[
    ("t", "type"),
    ("f", "file"),
    ("lang", "language"),
    ("v", "visibility"),
    ("s", "summary"),
    ("c", "criticality"),
    ("fr", "from"),
    ("to", "to"),
    ("ep", "entry_points"),
    ("cd", "core_domains"),
    ("cs", "churn_score"),
    ("rs", "risk_score"),
];

/// Resolve a (possibly aliased) field name to its long form.
pub fn canonical_field(name: &str) -> &str {
    FIELD_ALIASES
        .iter()
        .find(|(short, _)| *short == name)
        .map(|(_, long)| *long)
        .unwrap_or(name)
}

/// Resolve a long field name to its compact alias, if one exists.
pub fn compact_field(name: &str) -> &str {
    FIELD_ALIASES
        .iter()
        .find(|(_, long)| *long == name)
        .map(|(short, _)| *short)
        .unwrap_or(name)
}

fn rename_keys(obj: &mut Map<String, Value>, table: &[(&str, &str)]) {
    let mut renamed = Map::new();
    for (key, value) in std::mem::take(obj) {
        let new_key = table
            .iter()
            .find(|(a, _)| *a == key)
            .map(|(_, b)| b.to_string())
            .unwrap_or(key);
        renamed.insert(new_key, value);
    }
    *obj = renamed;
}

const NODE_TO_COMPACT: &[(&str, &str)] = &[
    ("type", "t"),
    ("file", "f"),
    ("language", "lang"),
    ("visibility", "v"),
    ("summary", "s"),
    ("criticality", "c"),
];
const NODE_FROM_COMPACT: &[(&str, &str)] = &[
    ("t", "type"),
    ("f", "file"),
    ("lang", "language"),
    ("v", "visibility"),
    ("s", "summary"),
    ("c", "criticality"),
];
const EDGE_TO_COMPACT: &[(&str, &str)] = &[("from", "fr"), ("type", "t")];
const EDGE_FROM_COMPACT: &[(&str, &str)] = &[("fr", "from"), ("t", "type")];
const SUMMARY_TO_COMPACT: &[(&str, &str)] =
    &[("entry_points", "ep"), ("core_domains", "cd")];
const SUMMARY_FROM_COMPACT: &[(&str, &str)] =
    &[("ep", "entry_points"), ("cd", "core_domains")];
const HISTORY_TO_COMPACT: &[(&str, &str)] = &[("churn_score", "cs")];
const HISTORY_FROM_COMPACT: &[(&str, &str)] = &[("cs", "churn_score")];
const RISK_TO_COMPACT: &[(&str, &str)] = &[("risk_score", "rs")];
const RISK_FROM_COMPACT: &[(&str, &str)] = &[("rs", "risk_score")];

fn apply_compact(value: &mut Value, to_compact: bool) {
    let Some(root) = value.as_object_mut() else {
        return;
    };
    let (node_t, edge_t, summary_t, history_t, risk_t) = if to_compact {
        (
            NODE_TO_COMPACT,
            EDGE_TO_COMPACT,
            SUMMARY_TO_COMPACT,
            HISTORY_TO_COMPACT,
            RISK_TO_COMPACT,
        )
    } else {
        (
            NODE_FROM_COMPACT,
            EDGE_FROM_COMPACT,
            SUMMARY_FROM_COMPACT,
            HISTORY_FROM_COMPACT,
            RISK_FROM_COMPACT,
        )
    };
    if let Some(nodes) = root.get_mut("nodes").and_then(Value::as_object_mut) {
        for node in nodes.values_mut() {
            if let Some(obj) = node.as_object_mut() {
                rename_keys(obj, node_t);
            }
        }
    }
    if let Some(edges) = root.get_mut("edges").and_then(Value::as_array_mut) {
        for edge in edges {
            if let Some(obj) = edge.as_object_mut() {
                rename_keys(obj, edge_t);
            }
        }
    }
    if let Some(summary) = root.get_mut("summary").and_then(Value::as_object_mut) {
        rename_keys(summary, summary_t);
    }
    if let Some(history) = root.get_mut("history").and_then(Value::as_object_mut) {
        for entry in history.values_mut() {
            if let Some(obj) = entry.as_object_mut() {
                rename_keys(obj, history_t);
            }
        }
    }
    if let Some(risk) = root.get_mut("risk").and_then(Value::as_object_mut) {
        for entry in risk.values_mut() {
            if let Some(obj) = entry.as_object_mut() {
                rename_keys(obj, risk_t);
            }
        }
    }
}

fn lite_value(genome: &Genome) -> Result<Value> {
    let mut root = Map::new();
    root.insert(
        "metadata".into(),
        serde_json::to_value(&genome.metadata)
            .map_err(|e| GenomeError::invalid_input(e.to_string()))?,
    );
    root.insert(
        "summary".into(),
        serde_json::to_value(&genome.summary)
            .map_err(|e| GenomeError::invalid_input(e.to_string()))?,
    );
    let mut nodes = Map::new();
    for (id, node) in &genome.nodes {
        let mut slim = Map::new();
        slim.insert("id".into(), Value::String(id.as_str().to_string()));
        slim.insert(
            "type".into(),
            serde_json::to_value(node.node_type)
                .map_err(|e| GenomeError::invalid_input(e.to_string()))?,
        );
        if let Some(file) = &node.file {
            slim.insert("file".into(), Value::String(file.clone()));
        }
        nodes.insert(id.as_str().to_string(), Value::Object(slim));
    }
    root.insert("nodes".into(), Value::Object(nodes));
    let edges: Vec<Value> = genome
        .edges
        .iter()
        .map(|e| {
            let mut slim = Map::new();
            slim.insert("from".into(), Value::String(e.from.as_str().to_string()));
            slim.insert("to".into(), Value::String(e.to.as_str().to_string()));
            slim.insert(
                "type".into(),
                serde_json::to_value(e.edge_type).unwrap_or(Value::Null),
            );
            Value::Object(slim)
        })
        .collect();
    root.insert("edges".into(), Value::Array(edges));
    Ok(Value::Object(root))
}

/// Serialize a genome in the given mode, optionally gzip-wrapped.
pub fn save(genome: &Genome, mode: EncodeMode, gzip: bool) -> Result<Vec<u8>> {
    let mut tagged = genome.clone();
    tagged.metadata.mode = mode;
    let value = match mode {
        EncodeMode::Standard => serde_json::to_value(&tagged)
            .map_err(|e| GenomeError::invalid_input(e.to_string()))?,
        EncodeMode::Compact => {
            let mut value = serde_json::to_value(&tagged)
                .map_err(|e| GenomeError::invalid_input(e.to_string()))?;
            apply_compact(&mut value, true);
            value
        }
        EncodeMode::Lite => lite_value(&tagged)?,
    };
    let json = serde_json::to_string_pretty(&value)
        .map_err(|e| GenomeError::invalid_input(e.to_string()))?;
    if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(json.as_bytes())?;
        Ok(encoder.finish()?)
    } else {
        Ok(json.into_bytes())
    }
}

/// Load a genome from bytes, auto-detecting gzip and encoding mode.
pub fn load(bytes: &[u8]) -> Result<Genome> {
    let json = if bytes.starts_with(&GZIP_MAGIC) {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = String::new();
        decoder.read_to_string(&mut out)?;
        out
    } else {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| GenomeError::invalid_input(format!("artifact is not UTF-8: {e}")))?
    };
    let mut value: Value = serde_json::from_str(&json)
        .map_err(|e| GenomeError::invalid_input(format!("artifact is not JSON: {e}")))?;

    let metadata = value
        .get("metadata")
        .and_then(Value::as_object)
        .ok_or_else(|| GenomeError::invalid_input("artifact has no metadata section"))?;
    let schema_version = metadata
        .get("schema_version")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    if schema_version != SCHEMA_VERSION {
        return Err(GenomeError::Stale {
            message: format!(
                "artifact schema version {schema_version}, engine supports {SCHEMA_VERSION}"
            ),
        });
    }
    let mode: EncodeMode = metadata
        .get("mode")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| GenomeError::invalid_input(format!("bad mode tag: {e}")))?
        .unwrap_or_default();

    if mode == EncodeMode::Compact {
        apply_compact(&mut value, false);
    }
    serde_json::from_value(value)
        .map_err(|e| GenomeError::invalid_input(format!("artifact decode failed: {e}")))
}

/// Persist to the repo root under the default artifact name.
pub fn save_to_repo(genome: &Genome, root: &Path, mode: EncodeMode, gzip: bool) -> Result<std::path::PathBuf> {
    let name = if gzip { ARTIFACT_NAME_GZ } else { ARTIFACT_NAME };
    let path = root.join(name);
    std::fs::write(&path, save(genome, mode, gzip)?)?;
    tracing::debug!(path = %path.display(), "genome persisted");
    Ok(path)
}

/// Load from the repo root, preferring the plain artifact over the gzip one.
pub fn load_from_repo(root: &Path) -> Result<Option<Genome>> {
    for name in [ARTIFACT_NAME, ARTIFACT_NAME_GZ] {
        let path = root.join(name);
        if path.exists() {
            let bytes = std::fs::read(&path)?;
            return load(&bytes).map(Some);
        }
    }
    Ok(None)
}
