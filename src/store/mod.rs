//! Persistence collaborator: the store contract the resource factory drives.
//!
//! Records are JSON objects keyed by the model's primary-key field. A store
//! reports uniqueness failures as [`StoreError::UniqueViolation`] so the
//! factory can turn them into conflicts; everything else is opaque to callers.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::config::SortSpec;
use crate::filter::WhereClause;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unique constraint violation: {message}")]
    UniqueViolation {
        constraint: Option<String>,
        message: String,
    },
    #[error("record has no value for primary key '{0}'")]
    MissingKey(String),
    #[error("record no longer exists")]
    Gone,
    #[error("primary key {0} leaves no room for generated keys")]
    KeyRange(i64),
    #[error("database: {0}")]
    Database(sqlx::Error),
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StoreError::UniqueViolation {
                    constraint: db_err.constraint().map(|s| s.to_string()),
                    message: db_err.message().to_string(),
                };
            }
        }
        StoreError::Database(err)
    }
}

/// Arguments of a list query.
#[derive(Clone, Debug, Default)]
pub struct FindOptions {
    pub filter: WhereClause,
    pub limit: Option<u64>,
    pub offset: u64,
    pub order: Vec<SortSpec>,
}

#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn find_one(&self, filter: &WhereClause) -> Result<Option<Value>, StoreError>;

    async fn find_all(&self, options: &FindOptions) -> Result<Vec<Value>, StoreError>;

    async fn create(&self, payload: Map<String, Value>) -> Result<Value, StoreError>;

    /// Apply `payload` to a record previously returned by this store.
    async fn update(&self, record: &Value, payload: Map<String, Value>) -> Result<Value, StoreError>;

    /// Delete a record previously returned by this store; returns the deleted record.
    async fn destroy(&self, record: &Value) -> Result<Value, StoreError>;
}

pub(crate) fn key_of<'a>(record: &'a Value, pk: &str) -> Result<&'a Value, StoreError> {
    match record.get(pk) {
        Some(v) if !v.is_null() => Ok(v),
        _ => Err(StoreError::MissingKey(pk.to_string())),
    }
}
