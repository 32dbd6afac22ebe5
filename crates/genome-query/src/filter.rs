//! Structured predicate trees
//!
//! Wire forms accepted:
//! - shorthand maps: `{"type": "function", "language": "Python"}` (AND of eq)
//! - explicit leaves: `{"field": "criticality", "op": "gte", "value": 0.5}`,
//!   `{"field": "file", "regex": "^src/"}`, `{"field": "type", "in": [...]}`,
//!   `{"field": "c", "between": [0.2, 0.8]}`
//! - compounds of unbounded arity: `{"and": [...]}`, `{"or": [...]}`,
//!   `{"not": ...}`
//!
//! Field names accept both long and compact alias forms.

use genome_core::encode::canonical_field;
use genome_core::{GenomeError, Node, Result};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" | "==" => Some(CmpOp::Eq),
            "ne" | "!=" => Some(CmpOp::Ne),
            "gt" | ">" => Some(CmpOp::Gt),
            "gte" | ">=" => Some(CmpOp::Gte),
            "lt" | "<" => Some(CmpOp::Lt),
            "lte" | "<=" => Some(CmpOp::Lte),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Gt => "gt",
            CmpOp::Gte => "gte",
            CmpOp::Lt => "lt",
            CmpOp::Lte => "lte",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Cmp {
        field: String,
        op: CmpOp,
        value: Value,
    },
    Regex {
        field: String,
        regex: regex::Regex,
    },
    In {
        field: String,
        values: Vec<Value>,
    },
    Between {
        field: String,
        lo: f64,
        hi: f64,
    },
    /// Matches every node. The empty predicate.
    True,
}

impl Predicate {
    /// Parse the wire form.
    pub fn parse(value: &Value) -> Result<Predicate> {
        match value {
            Value::Null => Ok(Predicate::True),
            Value::Object(map) if map.is_empty() => Ok(Predicate::True),
            Value::Object(map) => {
                if let Some(children) = map.get("and") {
                    return Ok(Predicate::And(Self::parse_list(children)?));
                }
                if let Some(children) = map.get("or") {
                    return Ok(Predicate::Or(Self::parse_list(children)?));
                }
                if let Some(child) = map.get("not") {
                    return Ok(Predicate::Not(Box::new(Self::parse(child)?)));
                }
                if let Some(field) = map.get("field").and_then(Value::as_str) {
                    return Self::parse_leaf(field, map);
                }
                // Shorthand: AND of field equality.
                let mut children = Vec::new();
                for (field, expected) in map {
                    children.push(Predicate::Cmp {
                        field: canonical_field(field).to_string(),
                        op: CmpOp::Eq,
                        value: expected.clone(),
                    });
                }
                Ok(Predicate::And(children))
            }
            _ => Err(GenomeError::invalid_input(
                "predicate must be an object or null",
            )),
        }
    }

    fn parse_list(value: &Value) -> Result<Vec<Predicate>> {
        let items = value
            .as_array()
            .ok_or_else(|| GenomeError::invalid_input("compound predicate expects an array"))?;
        items.iter().map(Self::parse).collect()
    }

    fn parse_leaf(field: &str, map: &serde_json::Map<String, Value>) -> Result<Predicate> {
        let field = canonical_field(field).to_string();
        if let Some(pattern) = map.get("regex").and_then(Value::as_str) {
            let regex = regex::Regex::new(pattern)
                .map_err(|e| GenomeError::invalid_input(format!("bad regex: {e}")))?;
            return Ok(Predicate::Regex { field, regex });
        }
        if let Some(values) = map.get("in").and_then(Value::as_array) {
            return Ok(Predicate::In {
                field,
                values: values.clone(),
            });
        }
        if let Some(range) = map.get("between").and_then(Value::as_array) {
            let (lo, hi) = match (range.first().and_then(Value::as_f64), range.get(1).and_then(Value::as_f64)) {
                (Some(lo), Some(hi)) => (lo, hi),
                _ => {
                    return Err(GenomeError::invalid_input(
                        "between expects [lo, hi] numbers",
                    ))
                }
            };
            return Ok(Predicate::Between { field, lo, hi });
        }
        let op = map
            .get("op")
            .and_then(Value::as_str)
            .and_then(CmpOp::parse)
            .unwrap_or(CmpOp::Eq);
        let value = map
            .get("value")
            .cloned()
            .ok_or_else(|| GenomeError::invalid_input(format!("leaf on `{field}` has no value")))?;
        Ok(Predicate::Cmp { field, op, value })
    }

    /// Canonical string used in cache keys: identical predicates normalize
    /// identically regardless of wire spelling.
    pub fn normalized(&self) -> String {
        match self {
            Predicate::True => "true".to_string(),
            Predicate::And(children) => {
                let mut parts: Vec<String> = children.iter().map(|c| c.normalized()).collect();
                parts.sort();
                format!("and({})", parts.join(","))
            }
            Predicate::Or(children) => {
                let mut parts: Vec<String> = children.iter().map(|c| c.normalized()).collect();
                parts.sort();
                format!("or({})", parts.join(","))
            }
            Predicate::Not(child) => format!("not({})", child.normalized()),
            Predicate::Cmp { field, op, value } => format!("{field} {} {value}", op.name()),
            Predicate::Regex { field, regex } => format!("{field} regex {}", regex.as_str()),
            Predicate::In { field, values } => {
                let joined: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                format!("{field} in [{}]", joined.join(","))
            }
            Predicate::Between { field, lo, hi } => format!("{field} between {lo} {hi}"),
        }
    }

    pub fn matches(&self, node: &Node) -> bool {
        match self {
            Predicate::True => true,
            Predicate::And(children) => children.iter().all(|c| c.matches(node)),
            Predicate::Or(children) => children.iter().any(|c| c.matches(node)),
            Predicate::Not(child) => !child.matches(node),
            Predicate::Cmp { field, op, value } => {
                let actual = field_value(node, field);
                compare(&actual, *op, value)
            }
            Predicate::Regex { field, regex } => match field_value(node, field) {
                Value::String(s) => regex.is_match(&s),
                _ => false,
            },
            Predicate::In { field, values } => {
                let actual = field_value(node, field);
                values.iter().any(|v| loose_eq(&actual, v))
            }
            Predicate::Between { field, lo, hi } => field_value(node, field)
                .as_f64()
                .map(|v| v >= *lo && v <= *hi)
                .unwrap_or(false),
        }
    }
}

/// Project a node field by canonical name.
pub fn field_value(node: &Node, field: &str) -> Value {
    match field {
        "id" => Value::String(node.id.as_str().to_string()),
        "type" => serde_json::to_value(node.node_type).unwrap_or(Value::Null),
        "file" => node
            .file
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
        "language" => node
            .language
            .and_then(|l| serde_json::to_value(l).ok())
            .unwrap_or(Value::Null),
        "visibility" => serde_json::to_value(node.visibility).unwrap_or(Value::Null),
        "summary" => node
            .summary
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
        "criticality" => serde_json::to_value(node.criticality).unwrap_or(Value::Null),
        "entry_point" => Value::Bool(node.entry_point),
        "line_start" => node
            .line_start
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null),
        "line_end" => node
            .line_end
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
        _ => match (a.as_str(), b.as_str()) {
            (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
            _ => a == b,
        },
    }
}

fn compare(actual: &Value, op: CmpOp, expected: &Value) -> bool {
    match op {
        CmpOp::Eq => loose_eq(actual, expected),
        CmpOp::Ne => !loose_eq(actual, expected),
        _ => {
            let (Some(a), Some(b)) = (actual.as_f64(), expected.as_f64()) else {
                return false;
            };
            match op {
                CmpOp::Gt => a > b,
                CmpOp::Gte => a >= b,
                CmpOp::Lt => a < b,
                CmpOp::Lte => a <= b,
                CmpOp::Eq | CmpOp::Ne => unreachable!(),
            }
        }
    }
}
