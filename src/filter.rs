//! Where clauses: field -> value (equality) or field -> {operator: value}.
//!
//! Built fresh per request by the resource factory and handed to a store,
//! which either evaluates it in memory ([`WhereClause::matches`]) or renders it
//! as SQL.

use crate::error::AppError;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    pub const ALL: [Operator; 6] = [
        Operator::Eq,
        Operator::Neq,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Neq => "<>",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
        }
    }

    /// Evaluate `left <op> right`. Ordering comparisons against null are false.
    pub fn test(self, left: &Value, right: &Value) -> bool {
        match (self, loose_cmp(left, right)) {
            (Operator::Eq, _) => loose_eq(left, right),
            (Operator::Neq, _) => !loose_eq(left, right),
            (_, None) => false,
            (Operator::Gt, Some(ord)) => ord == Ordering::Greater,
            (Operator::Gte, Some(ord)) => ord != Ordering::Less,
            (Operator::Lt, Some(ord)) => ord == Ordering::Less,
            (Operator::Lte, Some(ord)) => ord != Ordering::Greater,
        }
    }
}

impl FromStr for Operator {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| {
                AppError::BadRequest(format!(
                    "unsupported comparison operator '{}' (expected one of eq, neq, gt, gte, lt, lte)",
                    s
                ))
            })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Condition {
    Eq(Value),
    Ops(BTreeMap<Operator, Value>),
}

impl Condition {
    /// Combine two conditions on the same field (AND). A bare value becomes `eq`.
    pub fn merge(self, other: Condition) -> Condition {
        match (self, other) {
            (Condition::Eq(_), Condition::Eq(b)) => Condition::Eq(b),
            (Condition::Eq(a), Condition::Ops(mut ops)) => {
                ops.entry(Operator::Eq).or_insert(a);
                Condition::Ops(ops)
            }
            (Condition::Ops(mut ops), Condition::Eq(b)) => {
                ops.insert(Operator::Eq, b);
                Condition::Ops(ops)
            }
            (Condition::Ops(mut a), Condition::Ops(b)) => {
                a.extend(b);
                Condition::Ops(a)
            }
        }
    }

    pub fn comparisons(&self) -> Vec<(Operator, &Value)> {
        match self {
            Condition::Eq(v) => vec![(Operator::Eq, v)],
            Condition::Ops(ops) => ops.iter().map(|(op, v)| (*op, v)).collect(),
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        self.comparisons().into_iter().all(|(op, operand)| op.test(value, operand))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WhereClause {
    conditions: BTreeMap<String, Condition>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of an equality constraint.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(field.into(), Condition::Eq(value.into()));
        self
    }

    pub fn op(self, field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        let mut clause = self;
        let mut ops = BTreeMap::new();
        ops.insert(op, value.into());
        clause.merge(field, Condition::Ops(ops));
        clause
    }

    /// Replace any existing condition on `field`.
    pub fn insert(&mut self, field: impl Into<String>, condition: Condition) {
        self.conditions.insert(field.into(), condition);
    }

    /// AND `condition` into whatever is already constrained on `field`.
    pub fn merge(&mut self, field: impl Into<String>, condition: Condition) {
        let field = field.into();
        let merged = match self.conditions.remove(&field) {
            Some(existing) => existing.merge(condition),
            None => condition,
        };
        self.conditions.insert(field, merged);
    }

    pub fn get(&self, field: &str) -> Option<&Condition> {
        self.conditions.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Condition)> {
        self.conditions.iter()
    }

    /// True when every condition holds for `record`. Missing fields read as null.
    pub fn matches(&self, record: &Value) -> bool {
        self.conditions.iter().all(|(field, condition)| {
            let value = record.get(field).unwrap_or(&Value::Null);
            condition.matches(value)
        })
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Equality that treats `"13"` and `13` as the same value, the way path
/// parameters compare against stored numbers.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(_), _) | (_, Value::Number(_)) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => a == b,
        _ => scalar_string(a) == scalar_string(b),
    }
}

/// Ordering between two scalars; numeric when both read as numbers, else lexical.
pub fn loose_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (scalar_string(a), scalar_string(b)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => None,
    }
}
