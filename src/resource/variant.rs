//! The resource variants and their hooks.

use super::config::ResourceOptions;
use super::context::RequestContext;
use crate::error::AppError;
use crate::response::CollectionPage;
use axum::http::{Method, StatusCode};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Resource,
    Collection,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variant {
    Create,
    Read,
    Update,
    Partial,
    Delete,
    Collection,
}

impl Variant {
    pub const ALL: [Variant; 6] = [
        Variant::Create,
        Variant::Read,
        Variant::Update,
        Variant::Partial,
        Variant::Delete,
        Variant::Collection,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Variant::Create => "create",
            Variant::Read => "read",
            Variant::Update => "update",
            Variant::Partial => "partial",
            Variant::Delete => "delete",
            Variant::Collection => "collection",
        }
    }

    pub fn method(self) -> Method {
        match self {
            Variant::Create => Method::POST,
            Variant::Read | Variant::Collection => Method::GET,
            Variant::Update => Method::PUT,
            Variant::Partial => Method::PATCH,
            Variant::Delete => Method::DELETE,
        }
    }

    pub fn kind(self) -> ResourceKind {
        match self {
            Variant::Collection => ResourceKind::Collection,
            _ => ResourceKind::Resource,
        }
    }

    /// Variant-level status; `None` defers to the process default.
    pub fn default_status(self) -> Option<StatusCode> {
        match self {
            Variant::Delete => Some(StatusCode::NO_CONTENT),
            _ => None,
        }
    }

    pub fn default_options(self) -> ResourceOptions {
        match self {
            Variant::Read | Variant::Update | Variant::Partial | Variant::Delete => {
                ResourceOptions::new().allow_shortcut(false)
            }
            Variant::Create | Variant::Collection => ResourceOptions::new(),
        }
    }

    /// Runs before business logic and may rewrite the request.
    pub fn before_handler(self, ctx: &mut RequestContext) -> Result<(), AppError> {
        if self == Variant::Partial {
            let operations = ctx.payload.as_object_mut().and_then(|p| p.remove("operations"));
            if let Some(operations) = operations {
                ctx.payload = operations;
            }
        }
        Ok(())
    }

    /// Post-conditions on the business-logic result.
    pub fn after_handler(self, ctx: &RequestContext, result: &Value) -> Result<(), AppError> {
        match self {
            Variant::Read if is_falsy(result) => Err(AppError::NotFound("Not Found".into())),
            Variant::Update | Variant::Partial => {
                if let Some(before) = ctx.before_snapshot() {
                    let changed = changed_fields(before, result);
                    if !changed.is_empty() {
                        tracing::debug!(fields = ?changed, "entity changed");
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Variant-level result formatter, used when the instance sets none.
    pub fn format(self, ctx: &RequestContext, result: Value) -> Result<Value, AppError> {
        match self {
            Variant::Collection => {
                let Value::Array(items) = result else {
                    return Err(AppError::Internal("collection results must be an array".into()));
                };
                let page = CollectionPage {
                    limit: ctx.query_u64("limit"),
                    page: ctx.query_u64("page"),
                    count: items.len(),
                    data: items,
                };
                Ok(serde_json::to_value(page)?)
            }
            _ => Ok(result),
        }
    }
}

/// Null, false, zero and the empty string.
pub fn is_falsy(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn changed_fields(before: &Value, after: &Value) -> Vec<String> {
    let (Some(before), Some(after)) = (before.as_object(), after.as_object()) else {
        return Vec::new();
    };
    after
        .iter()
        .filter(|(k, v)| before.get(k.as_str()) != Some(*v))
        .map(|(k, _)| k.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn partial_unwraps_operations() {
        let mut ctx = RequestContext::new(Map::new(), Map::new(), json!({ "operations": { "frequency": 5 } }));
        Variant::Partial.before_handler(&mut ctx).unwrap();
        assert_eq!(ctx.payload, json!({ "frequency": 5 }));

        let mut ctx = RequestContext::new(Map::new(), Map::new(), json!({ "frequency": 5 }));
        Variant::Partial.before_handler(&mut ctx).unwrap();
        assert_eq!(ctx.payload, json!({ "frequency": 5 }));

        let mut ctx = RequestContext::new(Map::new(), Map::new(), json!({ "operations": { "frequency": 5 } }));
        Variant::Update.before_handler(&mut ctx).unwrap();
        assert!(ctx.payload.get("operations").is_some());
    }

    #[test]
    fn read_rejects_falsy_results() {
        let ctx = RequestContext::default();
        for falsy in [json!(null), json!(false), json!(0), json!("")] {
            let err = Variant::Read.after_handler(&ctx, &falsy).unwrap_err();
            assert_eq!(err.status(), StatusCode::NOT_FOUND);
        }
        assert!(Variant::Read.after_handler(&ctx, &json!({})).is_ok());
        assert!(Variant::Create.after_handler(&ctx, &json!(null)).is_ok());
    }

    #[test]
    fn collection_envelope() {
        let query = json!({ "limit": 2, "page": 1 }).as_object().cloned().unwrap();
        let ctx = RequestContext::new(Map::new(), query, Value::Null);
        let out = Variant::Collection.format(&ctx, json!([{ "id": 1 }, { "id": 2 }])).unwrap();
        assert_eq!(out, json!({ "limit": 2, "page": 1, "count": 2, "data": [{ "id": 1 }, { "id": 2 }] }));
        assert!(Variant::Collection.format(&ctx, json!({ "id": 1 })).is_err());
    }

    #[test]
    fn methods_and_statuses() {
        assert_eq!(Variant::Partial.method(), Method::PATCH);
        assert_eq!(Variant::Delete.default_status(), Some(StatusCode::NO_CONTENT));
        assert_eq!(Variant::Collection.kind(), ResourceKind::Collection);
    }

    #[test]
    fn changed_fields_against_snapshot() {
        let before = json!({ "id": 13, "frequency": 86400 });
        let after = json!({ "id": 13, "frequency": 500, "note": "x" });
        assert_eq!(changed_fields(&before, &after), vec!["frequency".to_string(), "note".to_string()]);
    }
}
