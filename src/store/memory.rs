//! In-process store: records in a `RwLock<Vec<_>>`, evaluated with the same where-clause semantics as SQL.

use super::{key_of, FindOptions, ModelStore, StoreError};
use crate::config::{ModelDescriptor, SortDirection};
use crate::filter::{loose_cmp, loose_eq, WhereClause};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct MemoryStore {
    model: Arc<ModelDescriptor>,
    rows: RwLock<Vec<Map<String, Value>>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new(model: Arc<ModelDescriptor>) -> Self {
        MemoryStore {
            model,
            rows: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Store pre-populated with `records`; each must be an object carrying the primary key.
    pub fn with_records(model: Arc<ModelDescriptor>, records: Vec<Value>) -> Result<Self, StoreError> {
        let pk = model.primary_key().to_string();
        let mut rows = Vec::with_capacity(records.len());
        let mut next_id = 1;
        for record in records {
            let Value::Object(row) = record else {
                return Err(StoreError::Other("seed records must be JSON objects".into()));
            };
            let key = key_of_map(&row, &pk)?;
            if let Some(n) = key.as_i64() {
                next_id = next_id.max(after(n)?);
            }
            rows.push(row);
        }
        Ok(MemoryStore {
            model,
            rows: RwLock::new(rows),
            next_id: AtomicI64::new(next_id),
        })
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Copy of every record, in insertion order.
    pub async fn records(&self) -> Vec<Value> {
        self.rows.read().await.iter().cloned().map(Value::Object).collect()
    }

    fn pk(&self) -> &str {
        self.model.primary_key()
    }

    fn conflict(&self, rows: &[Map<String, Value>], candidate: &Map<String, Value>, skip: Option<usize>) -> Option<String> {
        for set in self.model.unique_sets() {
            let values: Vec<&Value> = set.iter().filter_map(|f| candidate.get(f)).filter(|v| !v.is_null()).collect();
            if values.len() != set.len() {
                continue;
            }
            let clash = rows.iter().enumerate().any(|(i, row)| {
                Some(i) != skip
                    && set
                        .iter()
                        .zip(values.iter())
                        .all(|(f, v)| row.get(f).map(|existing| loose_eq(existing, v)).unwrap_or(false))
            });
            if clash {
                return Some(set.join(", "));
            }
        }
        None
    }

    fn stamp(&self, row: &mut Map<String, Value>, creating: bool) {
        let now = Value::String(chrono::Utc::now().to_rfc3339());
        if creating {
            if let Some(attr) = self.model.created_at() {
                row.entry(attr.field.clone()).or_insert_with(|| now.clone());
            }
        }
        if let Some(attr) = self.model.updated_at() {
            row.insert(attr.field.clone(), now);
        }
    }

    fn position(&self, rows: &[Map<String, Value>], record: &Value) -> Result<usize, StoreError> {
        let key = key_of(record, self.pk())?;
        rows.iter()
            .position(|row| row.get(self.pk()).map(|v| loose_eq(v, key)).unwrap_or(false))
            .ok_or(StoreError::Gone)
    }
}

/// The generated key following `n`.
fn after(n: i64) -> Result<i64, StoreError> {
    n.checked_add(1).ok_or(StoreError::KeyRange(n))
}

fn key_of_map<'a>(row: &'a Map<String, Value>, pk: &str) -> Result<&'a Value, StoreError> {
    match row.get(pk) {
        Some(v) if !v.is_null() => Ok(v),
        _ => Err(StoreError::MissingKey(pk.to_string())),
    }
}

fn compare_rows(a: &Value, b: &Value, options: &FindOptions) -> Ordering {
    for spec in &options.order {
        let left = a.get(&spec.field).unwrap_or(&Value::Null);
        let right = b.get(&spec.field).unwrap_or(&Value::Null);
        let ord = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => loose_cmp(left, right).unwrap_or(Ordering::Equal),
        };
        let ord = match spec.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl ModelStore for MemoryStore {
    async fn find_one(&self, filter: &WhereClause) -> Result<Option<Value>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .map(|row| Value::Object(row.clone()))
            .find(|record| filter.matches(record)))
    }

    async fn find_all(&self, options: &FindOptions) -> Result<Vec<Value>, StoreError> {
        let rows = self.rows.read().await;
        let mut matched: Vec<Value> = rows
            .iter()
            .map(|row| Value::Object(row.clone()))
            .filter(|record| options.filter.matches(record))
            .collect();
        if !options.order.is_empty() {
            matched.sort_by(|a, b| compare_rows(a, b, options));
        }
        let offset = usize::try_from(options.offset).unwrap_or(usize::MAX);
        let limit = options
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    async fn create(&self, payload: Map<String, Value>) -> Result<Value, StoreError> {
        let mut row = payload;
        let pk = self.pk().to_string();
        let mut rows = self.rows.write().await;
        let supplied = row.get(&pk).and_then(Value::as_i64);
        let next = supplied.map(after).transpose()?;
        if row.get(&pk).map(Value::is_null).unwrap_or(true) {
            let id = self
                .next_id
                .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| n.checked_add(1))
                .map_err(StoreError::KeyRange)?;
            row.insert(pk.clone(), Value::Number(id.into()));
        }
        if let Some(fields) = self.conflict(&rows, &row, None) {
            return Err(StoreError::UniqueViolation {
                constraint: Some(fields),
                message: format!("duplicate {} record", self.model.name),
            });
        }
        if let Some(next) = next {
            self.next_id.fetch_max(next, AtomicOrdering::SeqCst);
        }
        self.stamp(&mut row, true);
        rows.push(row.clone());
        Ok(Value::Object(row))
    }

    async fn update(&self, record: &Value, payload: Map<String, Value>) -> Result<Value, StoreError> {
        let mut rows = self.rows.write().await;
        let index = self.position(&rows, record)?;
        let mut updated = rows[index].clone();
        updated.extend(payload);
        if let Some(fields) = self.conflict(&rows, &updated, Some(index)) {
            return Err(StoreError::UniqueViolation {
                constraint: Some(fields),
                message: format!("duplicate {} record", self.model.name),
            });
        }
        self.stamp(&mut updated, false);
        rows[index] = updated.clone();
        Ok(Value::Object(updated))
    }

    async fn destroy(&self, record: &Value) -> Result<Value, StoreError> {
        let mut rows = self.rows.write().await;
        let index = self.position(&rows, record)?;
        Ok(Value::Object(rows.remove(index)))
    }
}
