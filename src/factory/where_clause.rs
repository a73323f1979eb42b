//! Where clauses for single-entity and collection lookups.

use super::FactoryOptions;
use crate::case::{is_identifier, param_key};
use crate::config::ModelDescriptor;
use crate::error::AppError;
use crate::filter::{Condition, Operator, WhereClause};
use crate::resource::is_falsy;
use crate::service::{coerce, FieldType};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Fields that identify the requested entity, each bound to the path
/// parameter that carries its value.
pub fn resource_bindings(
    model: &ModelDescriptor,
    params: &Map<String, Value>,
    options: &FactoryOptions,
) -> Vec<(String, String)> {
    if let Some(bindings) = &options.where_resource {
        return bindings.iter().map(|(f, p)| (f.clone(), p.clone())).collect();
    }
    let mut bindings = Vec::new();
    let own_key = model.param_key();
    if params.get(&own_key).map(|v| !is_falsy(v)).unwrap_or(false) {
        bindings.push((model.primary_key().to_string(), own_key));
    }
    if let Some(parent) = &options.parent_resource {
        let key = param_key(parent);
        bindings.push((key.clone(), key));
    }
    bindings
}

/// Clause locating one entity. Every binding must find its parameter.
pub fn resource_where(
    model: &ModelDescriptor,
    params: &Map<String, Value>,
    options: &FactoryOptions,
) -> Result<WhereClause, AppError> {
    let mut clause = WhereClause::new();
    for (field, param) in resource_bindings(model, params, options) {
        let value = bound_param(params, &param)?;
        clause.insert(field.clone(), Condition::Eq(coerce_for(model, "params", &field, value)?));
    }
    Ok(clause)
}

fn bound_param<'a>(params: &'a Map<String, Value>, param: &str) -> Result<&'a Value, AppError> {
    match params.get(param) {
        Some(value) if !value.is_null() => Ok(value),
        _ => Err(AppError::BadRequest(format!("missing path parameter '{}'", param))),
    }
}

/// Clause for a collection: the override or the parent scope, then the
/// request's `where` filter merged in.
pub fn collection_where(
    model: &ModelDescriptor,
    params: &Map<String, Value>,
    query: &Map<String, Value>,
    options: &FactoryOptions,
) -> Result<WhereClause, AppError> {
    let mut clause = match (&options.where_collection, &options.parent_resource) {
        (Some(fixed), _) => fixed.clone(),
        (None, Some(parent)) => {
            let key = param_key(parent);
            let value = bound_param(params, &key)?;
            let mut clause = WhereClause::new();
            clause.insert(key.clone(), Condition::Eq(coerce_for(model, "params", &key, value)?));
            clause
        }
        (None, None) => WhereClause::new(),
    };

    match query.get("where") {
        None | Some(Value::Null) => {}
        Some(Value::Object(filter)) => {
            for (field, spec) in filter {
                if !is_identifier(field) {
                    return Err(AppError::BadRequest(format!("invalid filter field '{}'", field)));
                }
                clause.merge(field.clone(), parse_condition(model, field, spec)?);
            }
        }
        Some(_) => return Err(AppError::BadRequest("where must be an object".into())),
    }
    tracing::debug!(model = %model.name, clause = %clause.to_value(), "collection where");
    Ok(clause)
}

fn parse_condition(model: &ModelDescriptor, field: &str, spec: &Value) -> Result<Condition, AppError> {
    match spec {
        Value::Object(ops) => {
            let mut parsed = BTreeMap::new();
            for (op, operand) in ops {
                let op: Operator = op.parse()?;
                parsed.insert(op, operand_value(model, field, operand)?);
            }
            Ok(Condition::Ops(parsed))
        }
        other => Ok(Condition::Eq(operand_value(model, field, other)?)),
    }
}

fn operand_value(model: &ModelDescriptor, field: &str, operand: &Value) -> Result<Value, AppError> {
    match operand {
        Value::String(s) if s == "null" => Ok(Value::Null),
        Value::Array(_) | Value::Object(_) => Err(AppError::BadRequest(format!(
            "filter value for '{}' must be a scalar",
            field
        ))),
        scalar => coerce_for(model, "where", field, scalar),
    }
}

/// Coerce a string to the declared type of `field`: the attribute type, else
/// the model's validation rule. Untyped fields keep the string.
fn coerce_for(model: &ModelDescriptor, section: &str, field: &str, value: &Value) -> Result<Value, AppError> {
    let declared = model
        .attribute_for_field(field)
        .and_then(|a| a.type_)
        .or_else(|| model.validation.as_ref().and_then(|s| s.get(field)).map(|r| r.type_));
    match (value, declared) {
        (Value::String(_), Some(type_)) if type_ != FieldType::Any => coerce(section, field, value, type_),
        _ => Ok(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Attribute;
    use crate::service::{FieldRule, Schema};
    use serde_json::json;

    fn report() -> ModelDescriptor {
        ModelDescriptor::new("Report").attribute("id", Attribute::new("id").primary())
    }

    fn nested() -> FactoryOptions {
        FactoryOptions::new().parent_resource("organization")
    }

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn operators_merge_per_field() {
        let query = map(json!({ "where": { "age": { "gt": "5", "lte": "10" } } }));
        let clause = collection_where(&report(), &Map::new(), &query, &FactoryOptions::new()).unwrap();
        assert_eq!(clause.to_value(), json!({ "age": { "gt": "5", "lte": "10" } }));
    }

    #[test]
    fn literal_null_becomes_null() {
        let query = map(json!({ "where": { "status": "null", "deletedAt": { "neq": "null" } } }));
        let clause = collection_where(&report(), &Map::new(), &query, &FactoryOptions::new()).unwrap();
        assert_eq!(clause.to_value(), json!({ "status": null, "deletedAt": { "neq": null } }));
    }

    #[test]
    fn parent_scopes_collections() {
        let params = map(json!({ "organizationId": "2" }));
        let clause = collection_where(&report(), &params, &Map::new(), &nested()).unwrap();
        assert_eq!(clause.to_value(), json!({ "organizationId": "2" }));
    }

    #[test]
    fn override_is_used_verbatim_with_filter_on_top() {
        let options = FactoryOptions::new()
            .parent_resource("organization")
            .where_collection(WhereClause::new().eq("archived", false));
        let params = map(json!({ "organizationId": "2" }));
        let query = map(json!({ "where": { "frequency": "60" } }));
        let clause = collection_where(&report(), &params, &query, &options).unwrap();
        assert_eq!(clause.to_value(), json!({ "archived": false, "frequency": "60" }));
    }

    #[test]
    fn unknown_operators_and_bad_fields_are_rejected() {
        let query = map(json!({ "where": { "age": { "like": "5" } } }));
        let err = collection_where(&report(), &Map::new(), &query, &FactoryOptions::new()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let query = map(json!({ "where": { "age; drop": "5" } }));
        assert!(collection_where(&report(), &Map::new(), &query, &FactoryOptions::new()).is_err());
    }

    #[test]
    fn operands_follow_attribute_types() {
        let model = report().attribute("age", Attribute::new("age").typed(FieldType::Integer));
        let query = map(json!({ "where": { "age": { "gte": "18" } } }));
        let clause = collection_where(&model, &Map::new(), &query, &FactoryOptions::new()).unwrap();
        assert_eq!(clause.to_value(), json!({ "age": { "gte": 18 } }));

        let query = map(json!({ "where": { "age": "old" } }));
        assert!(collection_where(&model, &Map::new(), &query, &FactoryOptions::new()).is_err());
    }

    #[test]
    fn resource_clause_uses_identity_and_parent() {
        let params = map(json!({ "organizationId": "2", "reportId": "13" }));
        let clause = resource_where(&report(), &params, &nested()).unwrap();
        assert_eq!(clause.to_value(), json!({ "id": "13", "organizationId": "2" }));

        let params = map(json!({ "organizationId": "2" }));
        let clause = resource_where(&report(), &params, &nested()).unwrap();
        assert_eq!(clause.to_value(), json!({ "organizationId": "2" }));
    }

    #[test]
    fn missing_parent_param_is_rejected_not_dropped() {
        let params = map(json!({ "reportId": "13" }));
        let err = resource_where(&report(), &params, &nested()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = collection_where(&report(), &Map::new(), &Map::new(), &nested()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn untyped_attributes_fall_back_to_validation_types() {
        let model = report().with_validation(Schema::new().field("frequency", FieldRule::integer()));
        let query = map(json!({ "where": { "frequency": { "gt": "5" } } }));
        let clause = collection_where(&model, &Map::new(), &query, &FactoryOptions::new()).unwrap();
        assert_eq!(clause.to_value(), json!({ "frequency": { "gt": 5 } }));
    }

    #[test]
    fn resource_override_binds_fields_to_params() {
        let mut bindings = BTreeMap::new();
        bindings.insert("slug".to_string(), "reportSlug".to_string());
        let options = FactoryOptions::new().where_resource(bindings);
        let params = map(json!({ "reportSlug": "daily", "reportId": "13" }));
        let clause = resource_where(&report(), &params, &options).unwrap();
        assert_eq!(clause.to_value(), json!({ "slug": "daily" }));
    }
}
