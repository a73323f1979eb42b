//! PostgreSQL store: one table per model, rows returned as JSON objects.

use super::{key_of, FindOptions, ModelStore, StoreError};
use crate::config::ModelDescriptor;
use crate::filter::WhereClause;
use crate::sql::{self, PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    model: Arc<ModelDescriptor>,
}

impl PgStore {
    pub fn new(pool: PgPool, model: Arc<ModelDescriptor>) -> Self {
        PgStore { pool, model }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_optional(&self, q: &QueryBuf) -> Result<Option<Value>, StoreError> {
        tracing::debug!(model = %self.model.name, sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let row = query.fetch_optional(&self.pool).await?;
        row.map(|r| row_json(&r)).transpose()
    }

    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Value>, StoreError> {
        tracing::debug!(model = %self.model.name, sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_json).collect()
    }
}

fn row_json(row: &PgRow) -> Result<Value, StoreError> {
    Ok(row.try_get::<Value, _>("row")?)
}

#[async_trait]
impl ModelStore for PgStore {
    async fn find_one(&self, filter: &WhereClause) -> Result<Option<Value>, StoreError> {
        let q = sql::select_one(&self.model, filter);
        self.fetch_optional(&q).await
    }

    async fn find_all(&self, options: &FindOptions) -> Result<Vec<Value>, StoreError> {
        let q = sql::select_list(&self.model, options);
        self.fetch_all(&q).await
    }

    async fn create(&self, payload: Map<String, Value>) -> Result<Value, StoreError> {
        let q = sql::insert(&self.model, &payload);
        self.fetch_optional(&q)
            .await?
            .ok_or_else(|| StoreError::Other(format!("insert into {} returned no row", self.model.table_name())))
    }

    async fn update(&self, record: &Value, payload: Map<String, Value>) -> Result<Value, StoreError> {
        let id = key_of(record, self.model.primary_key())?;
        let q = sql::update(&self.model, id, &payload);
        self.fetch_optional(&q).await?.ok_or(StoreError::Gone)
    }

    async fn destroy(&self, record: &Value) -> Result<Value, StoreError> {
        let id = key_of(record, self.model.primary_key())?;
        let q = sql::delete(&self.model, id);
        self.fetch_optional(&q).await?.ok_or(StoreError::Gone)
    }
}
