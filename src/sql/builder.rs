//! Builds parameterized SELECT, INSERT, UPDATE, DELETE for a model.
//!
//! Identifiers are quoted, values are always bound as parameters. Every
//! statement yields rows as a single `row_to_json` column named `row`.
//!
//! Placeholders of typed attributes carry a cast. Untyped fields bind with the
//! operand's own JSON type, so a filter value that stays a string binds as
//! `text`; declare a `type` (attribute or validation rule) for non-text columns.

use crate::config::ModelDescriptor;
use crate::filter::{Operator, WhereClause};
use crate::store::FindOptions;
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL.
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn qualified_table(model: &ModelDescriptor) -> String {
    format!("{}.{}", quoted(model.schema_name()), quoted(&model.table_name()))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        Self::default()
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }

    /// Placeholder for a value bound against `field`, cast when the attribute declares a type.
    fn placeholder(&mut self, model: &ModelDescriptor, field: &str, v: Value) -> String {
        let n = self.push_param(v);
        model
            .attribute_for_field(field)
            .and_then(|a| a.sql_type())
            .map(|t| format!("${}::{}", n, t))
            .unwrap_or_else(|| format!("${}", n))
    }
}

fn where_sql(model: &ModelDescriptor, filter: &WhereClause, q: &mut QueryBuf) -> String {
    let mut parts = Vec::new();
    for (field, condition) in filter.iter() {
        let col = quoted(field);
        for (op, operand) in condition.comparisons() {
            let part = match (op, operand.is_null()) {
                (Operator::Eq, true) => format!("{} IS NULL", col),
                (Operator::Neq, true) => format!("{} IS NOT NULL", col),
                (_, true) => "FALSE".to_string(),
                (Operator::Neq, false) => {
                    let ph = q.placeholder(model, field, operand.clone());
                    format!("{} IS DISTINCT FROM {}", col, ph)
                }
                (op, false) => {
                    let ph = q.placeholder(model, field, operand.clone());
                    format!("{} {} {}", col, op.sql(), ph)
                }
            };
            parts.push(part);
        }
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn wrap_rows(inner: &str) -> String {
    format!("SELECT row_to_json(t.*) AS row FROM ({}) t", inner)
}

/// First row matching `filter`.
pub fn select_one(model: &ModelDescriptor, filter: &WhereClause) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_clause = where_sql(model, filter, &mut q);
    let inner = format!("SELECT * FROM {}{} LIMIT 1", qualified_table(model), where_clause);
    q.sql = wrap_rows(&inner);
    q
}

/// Rows matching the options' filter, ordered, with LIMIT/OFFSET.
pub fn select_list(model: &ModelDescriptor, options: &FindOptions) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_clause = where_sql(model, &options.filter, &mut q);
    let order_clause = if options.order.is_empty() {
        String::new()
    } else {
        let specs: Vec<String> = options
            .order
            .iter()
            .map(|s| format!("{} {}", quoted(&s.field), s.direction.sql()))
            .collect();
        format!(" ORDER BY {}", specs.join(", "))
    };
    let limit_clause = options.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = if options.offset > 0 {
        format!(" OFFSET {}", options.offset)
    } else {
        String::new()
    };
    let inner = format!(
        "SELECT * FROM {}{}{}{}{}",
        qualified_table(model),
        where_clause,
        order_clause,
        limit_clause,
        offset_clause
    );
    q.sql = wrap_rows(&inner);
    q
}

/// INSERT the payload's fields; the database fills defaults for the rest.
pub fn insert(model: &ModelDescriptor, payload: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(model);
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for (name, val) in payload {
        cols.push(quoted(name));
        placeholders.push(q.placeholder(model, name, val.clone()));
    }
    let statement = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING *", table)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            table,
            cols.join(", "),
            placeholders.join(", ")
        )
    };
    q.sql = format!("WITH t AS ({}) SELECT row_to_json(t.*) AS row FROM t", statement);
    q
}

/// UPDATE by primary key: SET every payload field except the key itself.
pub fn update(model: &ModelDescriptor, id: &Value, payload: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(model);
    let pk = model.primary_key();
    let mut sets = Vec::new();
    for (k, v) in payload {
        if k == pk {
            continue;
        }
        let rhs = q.placeholder(model, k, v.clone());
        sets.push(format!("{} = {}", quoted(k), rhs));
    }
    if let Some(attr) = model.updated_at() {
        if !payload.contains_key(&attr.field) {
            sets.push(format!("{} = NOW()", quoted(&attr.field)));
        }
    }
    let id_ph = q.placeholder(model, pk, id.clone());
    if sets.is_empty() {
        let inner = format!("SELECT * FROM {} WHERE {} = {}", table, quoted(pk), id_ph);
        q.sql = wrap_rows(&inner);
        return q;
    }
    let statement = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING *",
        table,
        sets.join(", "),
        quoted(pk),
        id_ph
    );
    q.sql = format!("WITH t AS ({}) SELECT row_to_json(t.*) AS row FROM t", statement);
    q
}

/// DELETE by primary key, returning the deleted row.
pub fn delete(model: &ModelDescriptor, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = model.primary_key();
    let id_ph = q.placeholder(model, pk, id.clone());
    let statement = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING *",
        qualified_table(model),
        quoted(pk),
        id_ph
    );
    q.sql = format!("WITH t AS ({}) SELECT row_to_json(t.*) AS row FROM t", statement);
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Attribute, SortSpec};
    use crate::service::FieldType;
    use serde_json::json;

    fn model() -> ModelDescriptor {
        ModelDescriptor::new("Report")
            .with_table(Some("reporting"), "reports")
            .attribute("id", Attribute::new("id").primary().typed(FieldType::Integer))
            .attribute("updatedAt", Attribute::new("updated_at"))
    }

    #[test]
    fn select_with_operators_and_nulls() {
        let filter = WhereClause::new()
            .op("age", Operator::Gt, 5)
            .op("age", Operator::Lte, 10)
            .eq("status", Value::Null)
            .eq("id", "13");
        let q = select_one(&model(), &filter);
        assert_eq!(
            q.sql,
            "SELECT row_to_json(t.*) AS row FROM (SELECT * FROM \"reporting\".\"reports\" WHERE \
             \"age\" > $1 AND \"age\" <= $2 AND \"id\" = $3::bigint AND \"status\" IS NULL LIMIT 1) t"
        );
        assert_eq!(q.params, vec![json!(5), json!(10), json!("13")]);
    }

    #[test]
    fn list_with_order_and_paging() {
        let options = FindOptions {
            filter: WhereClause::new().eq("organizationId", "2"),
            limit: Some(20),
            offset: 40,
            order: vec![SortSpec::asc("created_at")],
        };
        let q = select_list(&model(), &options);
        assert!(q.sql.contains("WHERE \"organizationId\" = $1 ORDER BY \"created_at\" ASC LIMIT 20 OFFSET 40"));
    }

    #[test]
    fn update_skips_primary_key_and_touches_updated_at() {
        let payload = json!({ "id": 13, "frequency": 500 }).as_object().cloned().unwrap();
        let q = update(&model(), &json!(13), &payload);
        assert!(q.sql.contains("SET \"frequency\" = $1, \"updated_at\" = NOW() WHERE \"id\" = $2::bigint"));
        assert_eq!(q.params, vec![json!(500), json!(13)]);
    }

    #[test]
    fn insert_and_delete() {
        let payload = json!({ "frequency": 60 }).as_object().cloned().unwrap();
        let q = insert(&model(), &payload);
        assert!(q.sql.contains("INSERT INTO \"reporting\".\"reports\" (\"frequency\") VALUES ($1) RETURNING *"));
        let q = insert(&model(), &Map::new());
        assert!(q.sql.contains("DEFAULT VALUES"));
        let q = delete(&model(), &json!(7));
        assert!(q.sql.contains("DELETE FROM \"reporting\".\"reports\" WHERE \"id\" = $1::bigint RETURNING *"));
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quoted("we\"ird"), "\"we\"\"ird\"");
    }
}
