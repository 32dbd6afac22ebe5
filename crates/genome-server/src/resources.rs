//! Read-only resources
//!
//! URI-addressed views over the current snapshot. Loading `current` (or a
//! summary variant) satisfies the contract's load-before-mutate rule, so
//! the dispatcher is told which reads count as loads.

use serde_json::{json, Value};

use genome_core::{encode, EncodeMode, GenomeError, NodeId, Result};
use genome_engine::Engine;
use genome_query as query;

/// Serve a resource by URI. The bool says whether this read counts as a
/// genome load for the session contract.
pub fn get(engine: &Engine, uri: &str) -> Result<(Value, bool)> {
    let (path, query_string) = uri.split_once('?').unwrap_or((uri, ""));
    let snapshot = || {
        engine
            .snapshot()
            .ok_or_else(|| GenomeError::not_found("no genome loaded; run scan first"))
    };

    match path {
        "current" => {
            let genome = snapshot()?;
            let value = serde_json::to_value(genome.as_ref())
                .map_err(|e| GenomeError::invalid_input(e.to_string()))?;
            Ok((value, true))
        }
        "current/brief" => {
            let genome = snapshot()?;
            let bytes = encode::save(&genome, EncodeMode::Lite, false)?;
            let value = serde_json::from_slice(&bytes)
                .map_err(|e| GenomeError::invalid_input(e.to_string()))?;
            Ok((value, true))
        }
        "current/detailed" => {
            let genome = snapshot()?;
            let mut value = serde_json::to_value(genome.as_ref())
                .map_err(|e| GenomeError::invalid_input(e.to_string()))?;
            value["derived"] = query::stats(&genome);
            Ok((value, true))
        }
        "summary" => {
            let genome = snapshot()?;
            let mode = param(query_string, "mode").unwrap_or("standard");
            let value = match mode {
                "brief" => json!({
                    "counts": genome.summary.counts,
                    "entry_points": genome.summary.entry_points,
                }),
                "detailed" => {
                    let mut value = serde_json::to_value(&genome.summary)
                        .map_err(|e| GenomeError::invalid_input(e.to_string()))?;
                    value["languages"] = serde_json::to_value(&genome.metadata.languages)
                        .unwrap_or(Value::Null);
                    value["hotspot_details"] = Value::Array(
                        genome
                            .summary
                            .hotspots
                            .iter()
                            .filter_map(|id| genome.history.get(id).map(|h| json!({
                                "id": id.as_str(),
                                "churn_score": h.churn_score,
                            })))
                            .collect(),
                    );
                    value
                }
                "standard" => serde_json::to_value(&genome.summary)
                    .map_err(|e| GenomeError::invalid_input(e.to_string()))?,
                other => {
                    return Err(GenomeError::invalid_input(format!(
                        "unknown summary mode `{other}`"
                    )))
                }
            };
            Ok((value, true))
        }
        "diff" => {
            let delta = engine.last_delta();
            let value = match delta {
                Some(delta) => serde_json::to_value(&delta)
                    .map_err(|e| GenomeError::invalid_input(e.to_string()))?,
                None => json!({}),
            };
            Ok((value, false))
        }
        "stats" => {
            let genome = snapshot()?;
            Ok((query::stats(&genome), false))
        }
        _ => {
            if let Some(id) = path.strip_prefix("nodes/") {
                let genome = snapshot()?;
                let fields: Option<Vec<String>> = param(query_string, "fields")
                    .map(|f| f.split(',').map(str::to_string).collect());
                let node = genome
                    .node(&NodeId::from(id))
                    .ok_or_else(|| GenomeError::not_found(format!("node {id}")))?;
                return Ok((query::project(node, fields.as_deref(), None), false));
            }
            Err(GenomeError::not_found(format!("resource {path}")))
        }
    }
}

fn param<'a>(query_string: &'a str, key: &str) -> Option<&'a str> {
    query_string
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}
