//! Per-request input threaded through the pipeline.

use crate::error::AppError;
use serde_json::{Map, Value};
use std::sync::{Arc, OnceLock};

/// Validated params, query and payload of one request.
///
/// Cloning is cheap enough for business logic to take the context by value;
/// clones share the before-snapshot slot, so a snapshot set by a clone is seen
/// by the pipeline.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub params: Map<String, Value>,
    pub query: Map<String, Value>,
    pub payload: Value,
    before: Arc<OnceLock<Value>>,
}

impl RequestContext {
    pub fn new(params: Map<String, Value>, query: Map<String, Value>, payload: Value) -> Self {
        RequestContext {
            params,
            query,
            payload,
            before: Arc::new(OnceLock::new()),
        }
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    pub fn query_value(&self, name: &str) -> Option<&Value> {
        self.query.get(name)
    }

    /// Query value as an unsigned integer; numeric strings are accepted.
    pub fn query_u64(&self, name: &str) -> Option<u64> {
        match self.query.get(name)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn payload_object(&self) -> Option<&Map<String, Value>> {
        self.payload.as_object()
    }

    /// Record the entity as it was before this request mutated it. Can be set once.
    pub fn set_before_snapshot(&self, entity: Value) -> Result<(), AppError> {
        self.before
            .set(entity)
            .map_err(|_| AppError::Internal("before snapshot already set for this request".into()))
    }

    pub fn before_snapshot(&self) -> Option<&Value> {
        self.before.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_is_set_once_and_shared_by_clones() {
        let ctx = RequestContext::default();
        let clone = ctx.clone();
        clone.set_before_snapshot(json!({ "id": 13, "frequency": 86400 })).unwrap();
        assert_eq!(ctx.before_snapshot(), Some(&json!({ "id": 13, "frequency": 86400 })));
        assert!(ctx.set_before_snapshot(json!({})).is_err());
    }

    #[test]
    fn query_numbers_from_strings() {
        let query = json!({ "limit": "20", "page": 3, "where": {} });
        let ctx = RequestContext::new(Map::new(), query.as_object().cloned().unwrap(), Value::Null);
        assert_eq!(ctx.query_u64("limit"), Some(20));
        assert_eq!(ctx.query_u64("page"), Some(3));
        assert_eq!(ctx.query_u64("where"), None);
    }
}
