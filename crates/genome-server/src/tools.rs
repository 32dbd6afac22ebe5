//! Tool dispatch
//!
//! The fixed tool table with declared effects, and the implementations
//! wiring requests into the engine, query module, and context assembler.

use std::time::Duration;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde_json::{json, Value};

use genome_core::export::ExportFormat;
use genome_core::{
    CancelToken, EdgeType, Genome, GenomeError, NodeId, Result, TraversalDirection,
};
use genome_query::{
    self as query, ContextRequest, Predicate, QueryOptions, ResultCache,
};

use crate::session::ToolEffect;
use crate::ServerContext;

/// The fixed tool table. Unknown names are `InvalidInput`.
pub fn effect_of(name: &str) -> Option<ToolEffect> {
    match name {
        "scan" | "update" | "set_context_session" => Some(ToolEffect::Writer),
        "impact" => Some(ToolEffect::ImpactRecord),
        "query" | "get_node" | "search" | "dependencies" | "stats" | "export" | "validate"
        | "build_context" | "explain_context" | "get_context_skeleton" | "get_context_feedback"
        | "filter" | "compare" | "find_path" => Some(ToolEffect::Reader),
        _ => None,
    }
}

fn deadline_of(payload: &Value) -> CancelToken {
    match payload.get("timeout_ms").and_then(Value::as_u64) {
        Some(ms) => CancelToken::with_deadline(Duration::from_millis(ms)),
        None => CancelToken::unbounded(),
    }
}

fn snapshot(ctx: &ServerContext) -> Result<std::sync::Arc<Genome>> {
    ctx.engine
        .snapshot()
        .ok_or_else(|| GenomeError::not_found("no genome loaded; run scan first"))
}

pub fn dispatch(ctx: &ServerContext, name: &str, payload: &Value, session_id: &str) -> Result<Value> {
    match name {
        "scan" => scan(ctx, payload, session_id),
        "query" | "filter" => filtered_query(ctx, payload),
        "get_node" => get_node(ctx, payload),
        "search" => search(ctx, payload),
        "dependencies" => dependencies(ctx, payload),
        "stats" => Ok(query::stats(&*snapshot(ctx)?)),
        "export" => export(ctx, payload),
        "impact" => impact(ctx, payload, session_id),
        "update" => update(ctx, payload, session_id),
        "validate" => validate(ctx, session_id),
        "build_context" => build_context(ctx, payload),
        "explain_context" => explain_context(ctx, payload),
        "get_context_skeleton" => context_skeleton(ctx, payload),
        "get_context_feedback" => context_feedback(ctx, payload),
        "set_context_session" => set_context_session(ctx, payload),
        "compare" => compare(ctx, payload),
        "find_path" => find_path(ctx, payload),
        other => Err(GenomeError::invalid_input(format!("unknown tool `{other}`"))),
    }
}

fn scan(ctx: &ServerContext, payload: &Value, session_id: &str) -> Result<Value> {
    let incremental = payload
        .get("incremental")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let token = deadline_of(payload);
    let stats = ctx.engine.scan(incremental, &token)?;
    // A scan establishes the same state knowledge as loading `current`.
    ctx.sessions.mark_loaded(session_id, chrono::Utc::now());
    serde_json::to_value(&stats).map_err(|e| GenomeError::invalid_input(e.to_string()))
}

fn filtered_query(ctx: &ServerContext, payload: &Value) -> Result<Value> {
    let genome = snapshot(ctx)?;
    let predicate_value = payload.get("predicate").cloned().unwrap_or(Value::Null);
    let predicate = Predicate::parse(&predicate_value)?;
    let options = QueryOptions::from_payload(payload);

    let key = ResultCache::key(
        ctx.engine.generation(),
        &predicate.normalized(),
        &options.cache_key(),
    );
    if let Some(cached) = ctx.cache.get(&key) {
        return Ok(cached);
    }
    let page = query::query(&genome, &predicate, &options, ctx.engine.config())?;
    let value =
        serde_json::to_value(&page).map_err(|e| GenomeError::invalid_input(e.to_string()))?;
    ctx.cache.put(key, &value);

    let touched: Vec<NodeId> = page
        .items
        .iter()
        .filter_map(|item| {
            item.as_str()
                .map(NodeId::from)
                .or_else(|| item.get("id").and_then(Value::as_str).map(NodeId::from))
        })
        .collect();
    if !touched.is_empty() {
        ctx.assembler.observe(&touched);
    }
    Ok(value)
}

fn get_node(ctx: &ServerContext, payload: &Value) -> Result<Value> {
    let genome = snapshot(ctx)?;
    let id = required_str(payload, "id")?;
    let options = query::NodeOptions {
        max_depth: payload
            .get("max_depth")
            .and_then(Value::as_u64)
            .unwrap_or(1) as usize,
        include_edges: payload
            .get("include_edges")
            .and_then(Value::as_bool)
            .unwrap_or(true),
        edge_types: parse_edge_types(payload.get("edge_types"))?,
        fields: payload.get("fields").and_then(Value::as_array).map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        }),
    };
    let id = NodeId::from(id);
    let value = query::get_node(&genome, &id, &options)?;
    ctx.assembler.observe(&[id]);
    Ok(value)
}

fn search(ctx: &ServerContext, payload: &Value) -> Result<Value> {
    let genome = snapshot(ctx)?;
    let needle = payload.get("query").and_then(Value::as_str).unwrap_or("");
    let limit = payload
        .get("limit")
        .and_then(Value::as_u64)
        .unwrap_or(20)
        .min(200) as usize;
    let node_type = payload.get("node_type").and_then(Value::as_str);
    let language = payload.get("language").and_then(Value::as_str);
    let file_pattern = payload
        .get("file_pattern")
        .and_then(Value::as_str)
        .map(|p| {
            regex::escape(p).replace("\\*", ".*")
        })
        .map(|p| regex_lite(&p))
        .transpose()?;

    // A free-text query with no fuzzy needle routes through the keyword
    // translator onto the structured surface.
    if !needle.is_empty() && needle.split_whitespace().count() > 2 {
        if let Ok(predicate) = genome_query::nlq::translate(needle) {
            let parsed = Predicate::parse(&predicate)?;
            let options = QueryOptions {
                page_size: Some(limit),
                ..Default::default()
            };
            let page = query::query(&genome, &parsed, &options, ctx.engine.config())?;
            return serde_json::to_value(&page)
                .map_err(|e| GenomeError::invalid_input(e.to_string()));
        }
    }

    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<(i64, &genome_core::Node)> = genome
        .nodes
        .values()
        .filter(|n| {
            let type_ok = node_type
                .map(|t| {
                    serde_json::to_value(n.node_type)
                        .ok()
                        .and_then(|v| v.as_str().map(|s| s.eq_ignore_ascii_case(t)))
                        .unwrap_or(false)
                })
                .unwrap_or(true);
            let lang_ok = language
                .map(|l| {
                    n.language
                        .map(|nl| format!("{nl:?}").eq_ignore_ascii_case(l))
                        .unwrap_or(false)
                })
                .unwrap_or(true);
            let file_ok = file_pattern
                .as_ref()
                .map(|re| n.file.as_deref().map(|f| re.is_match(f)).unwrap_or(false))
                .unwrap_or(true);
            type_ok && lang_ok && file_ok
        })
        .filter_map(|n| {
            if needle.is_empty() {
                return Some((0, n));
            }
            let haystack = match &n.summary {
                Some(s) => format!("{} {s}", n.id),
                None => n.id.as_str().to_string(),
            };
            matcher.fuzzy_match(&haystack, needle).map(|s| (s, n))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));

    let items: Vec<Value> = scored
        .into_iter()
        .take(limit)
        .map(|(score, n)| {
            let mut value = query::project(n, None, None);
            value["match_score"] = json!(score);
            value
        })
        .collect();
    let touched: Vec<NodeId> = items
        .iter()
        .filter_map(|i| i.get("id").and_then(Value::as_str).map(NodeId::from))
        .collect();
    if !touched.is_empty() {
        ctx.assembler.observe(&touched);
    }
    Ok(json!({ "items": items }))
}

fn regex_lite(pattern: &str) -> Result<regex::Regex> {
    regex::Regex::new(pattern)
        .map_err(|e| GenomeError::invalid_input(format!("bad file pattern: {e}")))
}

fn dependencies(ctx: &ServerContext, payload: &Value) -> Result<Value> {
    let genome = snapshot(ctx)?;
    let id = NodeId::from(required_str(payload, "id")?);
    let direction = payload
        .get("direction")
        .and_then(Value::as_str)
        .unwrap_or("out");
    let direction = TraversalDirection::parse(direction)
        .ok_or_else(|| GenomeError::invalid_input("direction must be in, out, or both"))?;
    let depth = payload.get("depth").and_then(Value::as_u64).unwrap_or(1) as usize;
    query::dependencies(&genome, &id, direction, depth, ctx.engine.config())
}

fn export(ctx: &ServerContext, payload: &Value) -> Result<Value> {
    let format = payload
        .get("format")
        .and_then(Value::as_str)
        .unwrap_or("json");
    let format = ExportFormat::parse(format)
        .ok_or_else(|| GenomeError::invalid_input(format!("unknown export format `{format}`")))?;
    let out = payload
        .get("output_path")
        .and_then(Value::as_str)
        .map(std::path::PathBuf::from);
    let (path, bytes) = ctx.engine.export(format, out.as_deref())?;
    Ok(json!({ "path": path.display().to_string(), "bytes": bytes }))
}

const EDIT_EFFECTING: &[&str] = &["delete", "modify", "rename", "refactor", "rewrite"];

fn impact(ctx: &ServerContext, payload: &Value, session_id: &str) -> Result<Value> {
    let genome = snapshot(ctx)?;
    let affected: Vec<NodeId> = payload
        .get("affected_nodes")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(NodeId::from)
                .collect()
        })
        .unwrap_or_default();
    if affected.is_empty() {
        return Err(GenomeError::invalid_input("impact requires affected_nodes"));
    }
    let operation = payload
        .get("operation")
        .and_then(Value::as_str)
        .unwrap_or("modify");

    let op_weight = match operation {
        "delete" => 0.3,
        "rename" | "refactor" => 0.2,
        "modify" | "rewrite" => 0.15,
        _ => 0.1,
    };
    let mut risk: f32 = 0.0;
    let mut per_node = Vec::new();
    for id in &affected {
        let Some(node) = genome.node(id) else {
            return Err(GenomeError::not_found(format!("node {id}")));
        };
        let fan_in = genome
            .edges_to(id)
            .filter(|e| {
                matches!(
                    e.edge_type,
                    EdgeType::Calls | EdgeType::References | EdgeType::Imports | EdgeType::DependsOn
                )
            })
            .count();
        let prior_risk = genome
            .risk
            .get(id)
            .map(|r| r.risk_score.value())
            .unwrap_or(0.0);
        let node_risk = (op_weight
            + 0.05 * fan_in as f32
            + 0.3 * prior_risk
            + if node.entry_point { 0.1 } else { 0.0 })
        .min(1.0);
        risk = risk.max(node_risk);
        per_node.push(json!({
            "id": id.as_str(),
            "fan_in": fan_in,
            "risk": node_risk,
        }));
    }

    let affected_flows: Vec<Value> = genome
        .flows
        .iter()
        .filter(|f| f.path.iter().any(|id| affected.contains(id)))
        .map(|f| {
            json!({
                "entry": f.entry.as_str(),
                "length": f.path.len(),
            })
        })
        .collect();

    let requires_approval = risk >= 0.6;
    let result = json!({
        "risk": risk,
        "operation": operation,
        "nodes": per_node,
        "affected_flows": affected_flows,
        "requires_approval": requires_approval,
    });
    let edit_effecting = EDIT_EFFECTING.contains(&operation);
    ctx.sessions
        .record_impact(session_id, result.clone(), edit_effecting);
    Ok(result)
}

fn update(ctx: &ServerContext, payload: &Value, session_id: &str) -> Result<Value> {
    let reason = payload
        .get("reason")
        .and_then(Value::as_str)
        .ok_or_else(|| GenomeError::invalid_input("update requires a reason"))?;
    let mut hints: Vec<String> = Vec::new();
    for key in ["added", "removed", "updated"] {
        if let Some(paths) = payload.get(key).and_then(Value::as_array) {
            hints.extend(paths.iter().filter_map(Value::as_str).map(str::to_string));
        }
    }
    tracing::info!(reason, hints = hints.len(), "client-reported update");
    let token = deadline_of(payload);
    let stats = ctx.engine.scan_with_hints(true, &hints, &token)?;
    ctx.sessions.clear_pending(session_id);
    serde_json::to_value(&stats).map_err(|e| GenomeError::invalid_input(e.to_string()))
}

fn validate(ctx: &ServerContext, session_id: &str) -> Result<Value> {
    let violations = ctx.engine.validate()?;
    let ok = violations.is_empty();
    ctx.set_validation_blocked(!ok);
    if ok {
        // A clean validation settles the session's update debt.
        ctx.sessions.clear_pending(session_id);
    }
    Ok(json!({
        "ok": ok,
        "violations": violations,
    }))
}

fn build_context(ctx: &ServerContext, payload: &Value) -> Result<Value> {
    let genome = snapshot(ctx)?;
    let request = ContextRequest::from_payload(payload)?;
    let result = ctx.assembler.build(&genome, &request)?;
    serde_json::to_value(&result).map_err(|e| GenomeError::invalid_input(e.to_string()))
}

fn explain_context(ctx: &ServerContext, payload: &Value) -> Result<Value> {
    let context_id = required_str(payload, "context_id")?;
    let trace = ctx.assembler.explain(context_id)?;
    serde_json::to_value(&trace).map_err(|e| GenomeError::invalid_input(e.to_string()))
}

fn context_skeleton(ctx: &ServerContext, payload: &Value) -> Result<Value> {
    let genome = snapshot(ctx)?;
    let request = ContextRequest::from_payload(payload)?;
    let skeleton = ctx.assembler.skeleton(&genome, &request)?;
    serde_json::to_value(&skeleton).map_err(|e| GenomeError::invalid_input(e.to_string()))
}

fn context_feedback(ctx: &ServerContext, payload: &Value) -> Result<Value> {
    let context_id = required_str(payload, "context_id")?;
    let counters = ctx.assembler.feedback(context_id)?;
    serde_json::to_value(&counters).map_err(|e| GenomeError::invalid_input(e.to_string()))
}

fn set_context_session(ctx: &ServerContext, payload: &Value) -> Result<Value> {
    let session_id = required_str(payload, "session_id")?;
    let state = payload.get("state").cloned().unwrap_or(Value::Null);
    ctx.assembler.set_session(session_id, state);
    Ok(json!({ "ok": true }))
}

fn compare(ctx: &ServerContext, payload: &Value) -> Result<Value> {
    let genome = snapshot(ctx)?;
    let parse_side = |value: Option<&Value>| -> Result<(NodeId, Option<Genome>)> {
        match value {
            Some(Value::String(id)) => Ok((NodeId::from(id.as_str()), None)),
            Some(Value::Object(obj)) => {
                let id = obj
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| GenomeError::invalid_input("compare side needs an id"))?;
                let prior = match obj.get("artifact").and_then(Value::as_str) {
                    Some(path) => {
                        let bytes = std::fs::read(path)?;
                        Some(genome_core::encode::load(&bytes)?)
                    }
                    None => None,
                };
                Ok((NodeId::from(id), prior))
            }
            _ => Err(GenomeError::invalid_input(
                "compare requires `a` and `b` refs",
            )),
        }
    };
    let (a_id, a_prior) = parse_side(payload.get("a"))?;
    let (b_id, b_prior) = parse_side(payload.get("b"))?;
    query::compare(
        &genome,
        (&a_id, a_prior.as_ref()),
        (&b_id, b_prior.as_ref()),
    )
}

fn find_path(ctx: &ServerContext, payload: &Value) -> Result<Value> {
    let genome = snapshot(ctx)?;
    let from = NodeId::from(required_str(payload, "from")?);
    let to = NodeId::from(required_str(payload, "to")?);
    let max_len = payload
        .get("max_len")
        .and_then(Value::as_u64)
        .unwrap_or(ctx.engine.config().depth_cap as u64) as usize;
    let edge_types = parse_edge_types(payload.get("edge_types"))?;
    let path = query::find_path(&genome, &from, &to, max_len, edge_types.as_deref())?;
    Ok(json!({
        "path": path.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
        "length": path.len().saturating_sub(1),
    }))
}

fn parse_edge_types(value: Option<&Value>) -> Result<Option<Vec<EdgeType>>> {
    let Some(array) = value.and_then(Value::as_array) else {
        return Ok(None);
    };
    let mut types = Vec::new();
    for item in array {
        let name = item
            .as_str()
            .ok_or_else(|| GenomeError::invalid_input("edge_types must be strings"))?;
        let ty = EdgeType::parse(name)
            .ok_or_else(|| GenomeError::invalid_input(format!("unknown edge type `{name}`")))?;
        types.push(ty);
    }
    Ok(Some(types))
}

fn required_str<'a>(payload: &'a Value, key: &str) -> Result<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| GenomeError::invalid_input(format!("missing required field `{key}`")))
}
