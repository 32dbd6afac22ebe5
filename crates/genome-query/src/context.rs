//! Goal-driven context assembly
//!
//! Selects a genome subset maximizing relevance per token under a budget:
//! seed scoring, weighted expansion, sibling folding, greedy packing, and a
//! staged skeleton for low-latency first responses. Decision traces persist
//! per context id; sessions carry client-provided memory across calls.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::Serialize;
use serde_json::Value;

use genome_core::{
    EdgeType, Genome, GenomeError, GraphIndex, Node, NodeId, Result, TraversalDirection,
};

const SEED_FLOOR: f32 = 0.25;
const FOLD_FLOOR: f32 = 0.2;
const EXPAND_DEPTH: usize = 2;
const MAX_SEEDS: usize = 24;

#[derive(Debug, Clone)]
pub struct ContextRequest {
    pub goal: String,
    pub budget_tokens: usize,
    pub must_include: Vec<NodeId>,
    pub exclude: Vec<NodeId>,
    pub session_id: Option<String>,
}

impl ContextRequest {
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let goal = payload
            .get("goal")
            .and_then(Value::as_str)
            .ok_or_else(|| GenomeError::invalid_input("build_context requires a goal"))?
            .to_string();
        let ids = |key: &str| -> Vec<NodeId> {
            payload
                .get(key)
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(NodeId::from)
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(ContextRequest {
            goal,
            budget_tokens: payload
                .get("budget_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(8_000) as usize,
            must_include: ids("must_include"),
            exclude: ids("exclude"),
            session_id: payload
                .get("session_id")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextItem {
    pub id: String,
    pub relevance: f32,
    pub tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Sibling ids collapsed into this entry.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub folded: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Skeleton {
    pub entry_points: Vec<String>,
    pub core_domains: Vec<String>,
    pub clusters: Vec<ContextItem>,
    pub top_items: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextResult {
    pub context_id: String,
    pub items: Vec<ContextItem>,
    pub skeleton: Skeleton,
    pub budget_tokens: usize,
    pub used_tokens: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextTrace {
    pub goal: String,
    pub seeds: Vec<(String, f32)>,
    pub expanded: usize,
    pub folded_groups: usize,
    pub packed: Vec<String>,
    pub rejected_over_budget: Vec<String>,
    pub session_consulted: bool,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct FeedbackCounters {
    pub hits: u64,
    pub misses: u64,
}

/// ~4 characters per token, plus a fixed per-node framing overhead.
fn estimate_tokens(node: &Node) -> usize {
    let chars = node.id.as_str().len()
        + node.summary.as_deref().map(str::len).unwrap_or(0)
        + node.file.as_deref().map(str::len).unwrap_or(0)
        + 80;
    chars / 4
}

fn goal_keywords(goal: &str) -> Vec<String> {
    goal.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(str::to_ascii_lowercase)
        .collect()
}

pub struct ContextAssembler {
    traces: DashMap<String, ContextTrace>,
    /// context id → packed ids, for feedback attribution.
    memberships: DashMap<String, BTreeSet<String>>,
    feedback: DashMap<String, FeedbackCounters>,
    sessions: DashMap<String, Value>,
    counter: AtomicU64,
}

impl ContextAssembler {
    pub fn new() -> Self {
        ContextAssembler {
            traces: DashMap::new(),
            memberships: DashMap::new(),
            feedback: DashMap::new(),
            sessions: DashMap::new(),
            counter: AtomicU64::new(0),
        }
    }

    /// Store client-provided session memory (facts, pinned ids).
    pub fn set_session(&self, session_id: &str, state: Value) {
        self.sessions.insert(session_id.to_string(), state);
    }

    pub fn explain(&self, context_id: &str) -> Result<ContextTrace> {
        self.traces
            .get(context_id)
            .map(|t| t.clone())
            .ok_or_else(|| GenomeError::not_found(format!("context {context_id}")))
    }

    pub fn feedback(&self, context_id: &str) -> Result<FeedbackCounters> {
        if !self.memberships.contains_key(context_id) {
            return Err(GenomeError::not_found(format!("context {context_id}")));
        }
        Ok(self
            .feedback
            .get(context_id)
            .map(|f| f.clone())
            .unwrap_or_default())
    }

    /// Called by the serving layer after queries: ids the client actually
    /// touched count as hits against contexts that contained them.
    pub fn observe(&self, touched: &[NodeId]) {
        for entry in self.memberships.iter() {
            let mut counters = self.feedback.entry(entry.key().clone()).or_default();
            for id in touched {
                if entry.value().contains(id.as_str()) {
                    counters.hits += 1;
                } else {
                    counters.misses += 1;
                }
            }
        }
    }

    pub fn build(&self, genome: &Genome, request: &ContextRequest) -> Result<ContextResult> {
        let (items, skeleton, trace, used) = self.assemble(genome, request)?;
        let context_id = format!("ctx-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        self.memberships.insert(
            context_id.clone(),
            items.iter().map(|i| i.id.clone()).collect(),
        );
        self.traces.insert(context_id.clone(), trace);
        Ok(ContextResult {
            context_id,
            items,
            skeleton,
            budget_tokens: request.budget_tokens,
            used_tokens: used,
        })
    }

    /// Skeleton-only variant: no trace is recorded, the first page comes
    /// back immediately.
    pub fn skeleton(&self, genome: &Genome, request: &ContextRequest) -> Result<Skeleton> {
        let (_, skeleton, _, _) = self.assemble(genome, request)?;
        Ok(skeleton)
    }

    fn assemble(
        &self,
        genome: &Genome,
        request: &ContextRequest,
    ) -> Result<(Vec<ContextItem>, Skeleton, ContextTrace, usize)> {
        if request.goal.trim().is_empty() {
            return Err(GenomeError::invalid_input("context goal must not be empty"));
        }
        let matcher = SkimMatcherV2::default();
        let keywords = goal_keywords(&request.goal);
        let exclude: BTreeSet<&NodeId> = request.exclude.iter().collect();

        // Session memory: pinned ids join must_include.
        let mut must_include = request.must_include.clone();
        let session_consulted = match &request.session_id {
            Some(session_id) => match self.sessions.get(session_id) {
                Some(state) => {
                    if let Some(pinned) = state.get("pinned").and_then(Value::as_array) {
                        must_include
                            .extend(pinned.iter().filter_map(Value::as_str).map(NodeId::from));
                    }
                    true
                }
                None => false,
            },
            None => false,
        };

        // Concept membership bonus for nodes in concepts matching the goal.
        let mut concept_bonus: BTreeMap<&NodeId, f32> = BTreeMap::new();
        for concept in &genome.concepts {
            let description = concept.description.to_ascii_lowercase();
            if keywords.iter().any(|k| description.contains(k)) {
                for id in &concept.nodes {
                    concept_bonus.insert(id, 1.0);
                }
            }
        }

        // Graph proximity to must_include.
        let index = GraphIndex::from_genome(genome);
        let mut proximity: BTreeMap<NodeId, f32> = BTreeMap::new();
        for anchor in &must_include {
            proximity.insert(anchor.clone(), 1.0);
            for (id, dist) in index.expand(anchor, TraversalDirection::Both, 4, None) {
                let score = 1.0 / (1.0 + dist as f32);
                proximity
                    .entry(id)
                    .and_modify(|s| *s = s.max(score))
                    .or_insert(score);
            }
        }

        // 1. Seed scores: lexical, proximity, criticality, concept match.
        let mut relevance: BTreeMap<NodeId, f32> = BTreeMap::new();
        for node in genome.nodes.values() {
            if exclude.contains(&node.id) {
                continue;
            }
            let haystack = match &node.summary {
                Some(s) => format!("{} {s}", node.id),
                None => node.id.as_str().to_string(),
            };
            let lexical = matcher
                .fuzzy_match(&haystack, &request.goal)
                .map(|s| (s as f32 / 100.0).min(1.0))
                .unwrap_or(0.0);
            let prox = proximity.get(&node.id).copied().unwrap_or(0.0);
            let concept = concept_bonus.get(&node.id).copied().unwrap_or(0.0);
            let score = 0.5 * lexical
                + 0.25 * prox
                + 0.15 * node.criticality.value()
                + 0.1 * concept;
            if score > 0.0 {
                relevance.insert(node.id.clone(), score.min(1.0));
            }
        }
        for anchor in &must_include {
            relevance.insert(anchor.clone(), 1.0);
        }

        let mut seeds: Vec<(NodeId, f32)> = relevance
            .iter()
            .filter(|(_, s)| **s >= SEED_FLOOR)
            .map(|(id, s)| (id.clone(), *s))
            .collect();
        seeds.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        seeds.truncate(MAX_SEEDS);

        // 2. Expand around seeds along weighted edges.
        let mut expanded = 0usize;
        for (seed, seed_score) in &seeds {
            let mut frontier = vec![(seed.clone(), *seed_score)];
            for _ in 0..EXPAND_DEPTH {
                let mut next = Vec::new();
                for (id, score) in &frontier {
                    for (neighbor, ty) in
                        index.neighbors(id, TraversalDirection::Both, None)
                    {
                        if exclude.contains(&&neighbor) {
                            continue;
                        }
                        let weight = edge_weight(ty);
                        let propagated = score * weight;
                        if propagated < 0.05 {
                            continue;
                        }
                        let entry = relevance.entry(neighbor.clone()).or_insert(0.0);
                        if propagated > *entry {
                            *entry = propagated;
                            expanded += 1;
                            next.push((neighbor, propagated));
                        }
                    }
                }
                frontier = next;
                if frontier.is_empty() {
                    break;
                }
            }
        }

        // 3. Fold low-relevance siblings into their parent file.
        let mut candidates: Vec<(NodeId, f32)> = relevance.into_iter().collect();
        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let ca = genome.node(&a.0).map(|n| n.criticality.value()).unwrap_or(0.0);
                    let cb = genome.node(&b.0).map(|n| n.criticality.value()).unwrap_or(0.0);
                    cb.partial_cmp(&ca).unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut folds: BTreeMap<String, (Vec<String>, f32)> = BTreeMap::new();
        let mut direct: Vec<(NodeId, f32)> = Vec::new();
        for (id, score) in candidates {
            let Some(node) = genome.node(&id) else { continue };
            let is_must = must_include.contains(&id);
            if score < FOLD_FLOOR && !is_must {
                if let Some(file) = &node.file {
                    if file != id.as_str() {
                        let entry = folds.entry(file.clone()).or_default();
                        entry.0.push(id.as_str().to_string());
                        entry.1 = entry.1.max(score);
                        continue;
                    }
                }
                continue;
            }
            direct.push((id, score));
        }
        let folded_groups = folds.len();

        // 4. Greedy knapsack by relevance per token.
        #[derive(Clone)]
        struct Candidate {
            item: ContextItem,
            density: f32,
        }
        let mut pool: Vec<Candidate> = Vec::new();
        for (id, score) in &direct {
            let node = match genome.node(id) {
                Some(n) => n,
                None => continue,
            };
            let tokens = estimate_tokens(node).max(1);
            pool.push(Candidate {
                density: score / tokens as f32,
                item: ContextItem {
                    id: id.as_str().to_string(),
                    relevance: *score,
                    tokens,
                    summary: node.summary.clone(),
                    folded: Vec::new(),
                },
            });
        }
        for (file, (members, score)) in &folds {
            let tokens = (members.len() * 12).max(8);
            pool.push(Candidate {
                density: score / tokens as f32,
                item: ContextItem {
                    id: file.clone(),
                    relevance: *score,
                    tokens,
                    summary: Some(format!("{} folded sibling(s)", members.len())),
                    folded: members.clone(),
                },
            });
        }
        pool.sort_by(|a, b| {
            let forced_a = must_include.iter().any(|m| m.as_str() == a.item.id);
            let forced_b = must_include.iter().any(|m| m.as_str() == b.item.id);
            forced_b
                .cmp(&forced_a)
                .then(
                    b.density
                        .partial_cmp(&a.density)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then_with(|| a.item.id.cmp(&b.item.id))
        });

        let mut items = Vec::new();
        let mut rejected = Vec::new();
        let mut used = 0usize;
        for candidate in pool {
            if used + candidate.item.tokens <= request.budget_tokens {
                used += candidate.item.tokens;
                items.push(candidate.item);
            } else {
                rejected.push(candidate.item.id);
            }
        }

        // 5. Skeleton: the low-latency first page.
        let skeleton = Skeleton {
            entry_points: genome
                .summary
                .entry_points
                .iter()
                .map(|id| id.as_str().to_string())
                .collect(),
            core_domains: genome.summary.core_domains.clone(),
            clusters: items.iter().filter(|i| !i.folded.is_empty()).cloned().collect(),
            top_items: items.iter().take(10).map(|i| i.id.clone()).collect(),
        };

        let trace = ContextTrace {
            goal: request.goal.clone(),
            seeds: seeds
                .iter()
                .map(|(id, s)| (id.as_str().to_string(), *s))
                .collect(),
            expanded,
            folded_groups,
            packed: items.iter().map(|i| i.id.clone()).collect(),
            rejected_over_budget: rejected,
            session_consulted,
        };
        Ok((items, skeleton, trace, used))
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new()
    }
}

fn edge_weight(ty: EdgeType) -> f32 {
    match ty {
        EdgeType::Defines | EdgeType::Calls | EdgeType::Imports => 0.8,
        EdgeType::References | EdgeType::DependsOn => 0.5,
        EdgeType::Tests | EdgeType::Mutates | EdgeType::Emits => 0.3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genome_core::{Edge, Metadata, NodeType, Score};
    use serde_json::json;

    fn genome() -> Genome {
        let mut g = Genome::new(Metadata::new(chrono::Utc::now()));
        let specs = [
            ("auth.py", NodeType::File, None),
            ("auth.login", NodeType::Function, Some("authenticate a user session")),
            ("auth.logout", NodeType::Function, Some("end a user session")),
            ("billing.py", NodeType::File, None),
            ("billing.charge", NodeType::Function, Some("charge a card")),
        ];
        for (id, ty, summary) in specs {
            let mut n = Node::new(NodeId::from(id), ty);
            n.file = Some(if id.contains(".py") {
                id.to_string()
            } else {
                format!("{}.py", id.split('.').next().unwrap_or(id))
            });
            n.summary = summary.map(str::to_string);
            n.criticality = Score::new(0.5);
            g.nodes.insert(n.id.clone(), n);
        }
        g.insert_edge(Edge::new("auth.py".into(), "auth.login".into(), EdgeType::Defines));
        g.insert_edge(Edge::new("auth.py".into(), "auth.logout".into(), EdgeType::Defines));
        g.insert_edge(Edge::new("billing.py".into(), "billing.charge".into(), EdgeType::Defines));
        g.refresh_counts();
        g
    }

    fn request(goal: &str, budget: usize) -> ContextRequest {
        ContextRequest {
            goal: goal.into(),
            budget_tokens: budget,
            must_include: Vec::new(),
            exclude: Vec::new(),
            session_id: None,
        }
    }

    #[test]
    fn goal_relevant_nodes_rank_first() {
        let assembler = ContextAssembler::new();
        let result = assembler
            .build(&genome(), &request("auth login session", 4_000))
            .unwrap();
        assert!(!result.items.is_empty());
        assert!(result.items[0].id.starts_with("auth"));
        assert!(result.used_tokens <= 4_000);
    }

    #[test]
    fn budget_is_a_hard_cap() {
        let assembler = ContextAssembler::new();
        let result = assembler.build(&genome(), &request("auth", 30)).unwrap();
        assert!(result.used_tokens <= 30);
        let trace = assembler.explain(&result.context_id).unwrap();
        // Something had to be left out under so small a budget.
        assert!(!trace.rejected_over_budget.is_empty() || result.items.len() <= 1);
    }

    #[test]
    fn must_include_is_always_packed() {
        let assembler = ContextAssembler::new();
        let mut req = request("billing", 4_000);
        req.must_include = vec![NodeId::from("auth.logout")];
        let result = assembler.build(&genome(), &req).unwrap();
        assert!(result.items.iter().any(|i| i.id == "auth.logout"));
    }

    #[test]
    fn excluded_nodes_never_appear() {
        let assembler = ContextAssembler::new();
        let mut req = request("auth session", 4_000);
        req.exclude = vec![NodeId::from("auth.logout")];
        let result = assembler.build(&genome(), &req).unwrap();
        assert!(result.items.iter().all(|i| i.id != "auth.logout"));
    }

    #[test]
    fn explain_returns_the_decision_trace() {
        let assembler = ContextAssembler::new();
        let result = assembler.build(&genome(), &request("auth", 4_000)).unwrap();
        let trace = assembler.explain(&result.context_id).unwrap();
        assert_eq!(trace.goal, "auth");
        assert!(!trace.seeds.is_empty());
        assert!(matches!(
            assembler.explain("ctx-999"),
            Err(GenomeError::NotFound { .. })
        ));
    }

    #[test]
    fn sessions_pin_ids() {
        let assembler = ContextAssembler::new();
        assembler.set_session("s1", json!({"pinned": ["billing.charge"]}));
        let mut req = request("auth", 4_000);
        req.session_id = Some("s1".into());
        let result = assembler.build(&genome(), &req).unwrap();
        assert!(result.items.iter().any(|i| i.id == "billing.charge"));
        let trace = assembler.explain(&result.context_id).unwrap();
        assert!(trace.session_consulted);
    }

    #[test]
    fn feedback_counts_hits_and_misses() {
        let assembler = ContextAssembler::new();
        let result = assembler.build(&genome(), &request("auth", 4_000)).unwrap();
        let packed = NodeId::from(result.items[0].id.as_str());
        assembler.observe(&[packed, NodeId::from("not-in-context")]);
        let counters = assembler.feedback(&result.context_id).unwrap();
        assert_eq!(counters.hits, 1);
        assert_eq!(counters.misses, 1);
    }

    #[test]
    fn empty_goal_is_invalid() {
        let assembler = ContextAssembler::new();
        assert!(matches!(
            assembler.build(&genome(), &request("  ", 1_000)),
            Err(GenomeError::InvalidInput { .. })
        ));
    }
}
