//! Decode the raw query string into a nested JSON object.
//!
//! `where[age][gt]=5&page=2` becomes `{"where":{"age":{"gt":"5"}},"page":"2"}`.
//! Values stay strings; the collection's query schema coerces them. A bare
//! value and bracketed keys under the same name merge, the bare value as `eq`.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use serde_json::{Map, Value};

const EQ: &str = "eq";

/// Split `where[age][gt]` into `["where", "age", "gt"]`. Keys with unbalanced
/// brackets are kept whole.
fn key_segments(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_string()];
    };
    let mut segments = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            return vec![key.to_string()];
        };
        segments.push(stripped[..close].to_string());
        rest = &stripped[close + 1..];
    }
    if !rest.is_empty() {
        return vec![key.to_string()];
    }
    segments
}

fn insert_nested(target: &mut Map<String, Value>, segments: &[String], value: String) {
    let Some((head, tail)) = segments.split_first() else {
        return;
    };
    if tail.is_empty() {
        match target.get_mut(head) {
            // `where[f][gt]=5&where[f]=10` keeps both: the bare value joins as `eq`
            Some(Value::Object(inner)) => {
                inner.insert(EQ.to_string(), Value::String(value));
            }
            _ => {
                target.insert(head.clone(), Value::String(value));
            }
        }
        return;
    }
    // `a[]=x` appends to an array
    if tail.len() == 1 && tail[0].is_empty() {
        match target.get_mut(head) {
            Some(Value::Array(items)) => items.push(Value::String(value)),
            _ => {
                target.insert(head.clone(), Value::Array(vec![Value::String(value)]));
            }
        }
        return;
    }
    let slot = target
        .entry(head.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if slot.is_string() {
        let mut inner = Map::new();
        inner.insert(EQ.to_string(), slot.take());
        *slot = Value::Object(inner);
    } else if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(inner) = slot {
        insert_nested(inner, tail, value);
    }
}

/// Parse an `application/x-www-form-urlencoded` query string. Repeated scalar
/// keys keep the last value.
pub fn parse_query(raw: &str) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        if key.is_empty() {
            continue;
        }
        let segments = key_segments(&key);
        insert_nested(&mut out, &segments, value.into_owned());
    }
    out
}

/// Extractor for the decoded query string. An absent query yields an empty map.
#[derive(Clone, Debug, Default)]
pub struct NestedQuery(pub Map<String, Value>);

#[async_trait]
impl<S> FromRequestParts<S> for NestedQuery
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let query = parts.uri.query().map(parse_query).unwrap_or_default();
        Ok(NestedQuery(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bracket_keys_nest() {
        let q = parse_query("where[age][gt]=5&where[age][lte]=10&page=2");
        assert_eq!(
            Value::Object(q),
            json!({ "where": { "age": { "gt": "5", "lte": "10" } }, "page": "2" })
        );
    }

    #[test]
    fn percent_encoded_keys_are_decoded() {
        let q = parse_query("where%5Bstatus%5D=null&name=a%20b");
        assert_eq!(Value::Object(q), json!({ "where": { "status": "null" }, "name": "a b" }));
    }

    #[test]
    fn repeated_scalars_keep_last_and_arrays_append() {
        let q = parse_query("limit=5&limit=7&tag[]=a&tag[]=b");
        assert_eq!(Value::Object(q), json!({ "limit": "7", "tag": ["a", "b"] }));
    }

    #[test]
    fn bare_value_and_operators_merge_as_eq() {
        let q = parse_query("where[frequency]=10&where[frequency][gt]=5");
        assert_eq!(Value::Object(q), json!({ "where": { "frequency": { "eq": "10", "gt": "5" } } }));

        let q = parse_query("where[frequency][gt]=5&where[frequency]=10");
        assert_eq!(Value::Object(q), json!({ "where": { "frequency": { "gt": "5", "eq": "10" } } }));
    }

    #[test]
    fn malformed_brackets_stay_flat() {
        let q = parse_query("where[age=5&x]y=1");
        assert_eq!(Value::Object(q), json!({ "where[age": "5", "x]y": "1" }));
    }

    #[test]
    fn empty_query() {
        assert!(parse_query("").is_empty());
    }
}
