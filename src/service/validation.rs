//! Request validation from declarative field rules.
//!
//! Params and query values arrive as strings; validation coerces them to the
//! declared type, applies defaults and returns the coerced object.

use crate::error::AppError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Any,
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    #[serde(default, rename = "type")]
    pub type_: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default, alias = "maxLength")]
    pub max_length: Option<u32>,
    #[serde(default, alias = "minLength")]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

impl FieldRule {
    pub fn of(type_: FieldType) -> Self {
        FieldRule {
            type_,
            ..Default::default()
        }
    }

    pub fn any() -> Self {
        Self::of(FieldType::Any)
    }

    pub fn string() -> Self {
        Self::of(FieldType::String)
    }

    pub fn integer() -> Self {
        Self::of(FieldType::Integer)
    }

    pub fn number() -> Self {
        Self::of(FieldType::Number)
    }

    pub fn boolean() -> Self {
        Self::of(FieldType::Boolean)
    }

    pub fn object() -> Self {
        Self::of(FieldType::Object)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn min(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    pub fn max(mut self, maximum: f64) -> Self {
        self.maximum = Some(maximum);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn allowed(mut self, values: Vec<Value>) -> Self {
        self.allowed = Some(values);
        self
    }
}

/// Field name -> rule. Keys not named in the schema pass through unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: BTreeMap<String, FieldRule>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.insert(name.into(), rule);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, rule: FieldRule) {
        self.fields.insert(name.into(), rule);
    }

    pub fn get(&self, name: &str) -> Option<&FieldRule> {
        self.fields.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FieldRule> {
        self.fields.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldRule)> {
        self.fields.iter()
    }

    /// Rules of `other` replace same-named rules of `self`.
    pub fn merge(&self, other: &Schema) -> Schema {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        Schema { fields }
    }

    /// Validate a whole section. All required fields must be present and non-null.
    /// A null section is treated as an empty object.
    pub fn validate(&self, section: &str, value: &Value) -> Result<Map<String, Value>, AppError> {
        self.run(section, value, false)
    }

    /// Validate only the fields present (for partial updates). Defaults and required are not applied.
    pub fn validate_partial(&self, section: &str, value: &Value) -> Result<Map<String, Value>, AppError> {
        self.run(section, value, true)
    }

    fn run(&self, section: &str, value: &Value, partial: bool) -> Result<Map<String, Value>, AppError> {
        let mut out = match value {
            Value::Object(m) => m.clone(),
            Value::Null => Map::new(),
            _ => return Err(AppError::Validation(format!("{} must be an object", section))),
        };
        for (name, rule) in &self.fields {
            let present = out.get(name).map(|v| !v.is_null()).unwrap_or(false);
            if !present {
                if partial {
                    continue;
                }
                if let Some(default) = &rule.default {
                    out.insert(name.clone(), default.clone());
                    continue;
                }
                if rule.required {
                    return Err(AppError::Validation(format!("{}.{} is required", section, name)));
                }
                continue;
            }
            if let Some(v) = out.get_mut(name) {
                let coerced = coerce(section, name, v, rule.type_)?;
                validate_field(section, name, &coerced, rule)?;
                *v = coerced;
            }
        }
        Ok(out)
    }
}

pub(crate) fn coerce(section: &str, field: &str, v: &Value, type_: FieldType) -> Result<Value, AppError> {
    let fail = |what: &str| AppError::Validation(format!("{}.{} must be {}", section, field, what));
    Ok(match type_ {
        FieldType::Any => v.clone(),
        FieldType::String => match v {
            Value::String(_) => v.clone(),
            _ => return Err(fail("a string")),
        },
        FieldType::Integer => match v {
            Value::Number(n) if n.is_i64() || n.is_u64() => v.clone(),
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Value::Number((f as i64).into()),
                _ => return Err(fail("an integer")),
            },
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|n| Value::Number(n.into()))
                .map_err(|_| fail("an integer"))?,
            _ => return Err(fail("an integer")),
        },
        FieldType::Number => match v {
            Value::Number(_) => v.clone(),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| fail("a number"))?,
            _ => return Err(fail("a number")),
        },
        FieldType::Boolean => match v {
            Value::Bool(_) => v.clone(),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Value::Bool(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Value::Bool(false),
            _ => return Err(fail("a boolean")),
        },
        FieldType::Object => match v {
            Value::Object(_) => v.clone(),
            _ => return Err(fail("an object")),
        },
        FieldType::Array => match v {
            Value::Array(_) => v.clone(),
            _ => return Err(fail("an array")),
        },
    })
}

fn validate_field(section: &str, col: &str, v: &Value, rule: &FieldRule) -> Result<(), AppError> {
    if let Some(format) = &rule.format {
        validate_format(section, col, v, format)?;
    }
    if let Some(max) = rule.max_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() > max as usize {
                return Err(AppError::Validation(format!(
                    "{}.{} must be at most {} characters",
                    section, col, max
                )));
            }
        }
    }
    if let Some(min) = rule.min_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() < min as usize {
                return Err(AppError::Validation(format!(
                    "{}.{} must be at least {} characters",
                    section, col, min
                )));
            }
        }
    }
    if let Some(ref pattern) = rule.pattern {
        let re = Regex::new(pattern)
            .map_err(|_| AppError::Validation(format!("invalid pattern for {}.{}", section, col)))?;
        if let Some(s) = v.as_str() {
            if !re.is_match(s) {
                return Err(AppError::Validation(format!(
                    "{}.{} does not match required pattern",
                    section, col
                )));
            }
        }
    }
    if let Some(ref allowed) = rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(AppError::Validation(format!(
                "{}.{} must be one of: {:?}",
                section,
                col,
                allowed.iter().take(5).collect::<Vec<_>>()
            )));
        }
    }
    if let Some(min) = rule.minimum {
        if let Some(n) = v.as_f64() {
            if n < min {
                return Err(AppError::Validation(format!("{}.{} must be at least {}", section, col, min)));
            }
        }
    }
    if let Some(max) = rule.maximum {
        if let Some(n) = v.as_f64() {
            if n > max {
                return Err(AppError::Validation(format!("{}.{} must be at most {}", section, col, max)));
            }
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(section: &str, col: &str, v: &Value, format: &str) -> Result<(), AppError> {
    match format.to_lowercase().as_str() {
        "email" => {
            if let Some(s) = v.as_str() {
                if !s.contains('@') || s.len() < 3 {
                    return Err(AppError::Validation(format!("{}.{} must be a valid email", section, col)));
                }
            }
        }
        "uuid" => {
            if let Some(s) = v.as_str() {
                if uuid::Uuid::parse_str(s).is_err() {
                    return Err(AppError::Validation(format!("{}.{} must be a valid UUID", section, col)));
                }
            }
        }
        _ => {}
    }
    Ok(())
}
