//! Model descriptors: the attribute/validation description a resource factory is built from.

use crate::case::{param_key, to_snake_case};
use crate::service::{FieldType, Schema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity column used when no attribute is flagged as primary key.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Column name in the backing store.
    pub field: String,
    #[serde(default, rename = "primaryKey", alias = "primary_key")]
    pub primary_key: bool,
    /// Logical type, used to coerce path and filter values and to cast SQL parameters.
    #[serde(default, rename = "type")]
    pub type_: Option<FieldType>,
    /// PostgreSQL type name for parameter casts (e.g. "timestamptz"); overrides `type`.
    #[serde(default, rename = "columnType", alias = "column_type")]
    pub column_type: Option<String>,
    /// Never returned to clients.
    #[serde(default)]
    pub hidden: bool,
}

impl Attribute {
    pub fn new(field: impl Into<String>) -> Self {
        Attribute {
            field: field.into(),
            ..Default::default()
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn typed(mut self, type_: FieldType) -> Self {
        self.type_ = Some(type_);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// SQL cast for parameters bound against this column, if any.
    pub fn sql_type(&self) -> Option<&str> {
        if let Some(t) = self.column_type.as_deref() {
            return Some(t);
        }
        match self.type_? {
            FieldType::Integer => Some("bigint"),
            FieldType::Number => Some("double precision"),
            FieldType::Boolean => Some("boolean"),
            FieldType::String => Some("text"),
            FieldType::Object | FieldType::Array => Some("jsonb"),
            FieldType::Any => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        SortSpec {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        SortSpec {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    /// Backing table; defaults to the snake_case model name.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
    /// Payload constraints, used for create/update when no payload schema is given.
    #[serde(default)]
    pub validation: Option<Schema>,
    /// Preferred collection order.
    #[serde(default)]
    pub sorting: Vec<SortSpec>,
    /// Field sets that must be unique across records (the primary key always is).
    #[serde(default)]
    pub unique: Vec<Vec<String>>,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        ModelDescriptor {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    pub fn with_validation(mut self, schema: Schema) -> Self {
        self.validation = Some(schema);
        self
    }

    pub fn with_sorting(mut self, sorting: Vec<SortSpec>) -> Self {
        self.sorting = sorting;
        self
    }

    pub fn with_unique(mut self, fields: &[&str]) -> Self {
        self.unique.push(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn with_table(mut self, schema: Option<&str>, table: &str) -> Self {
        self.schema = schema.map(str::to_string);
        self.table = Some(table.to_string());
        self
    }

    pub fn primary_attribute(&self) -> Option<(&str, &Attribute)> {
        self.attributes
            .iter()
            .find(|(_, a)| a.primary_key)
            .map(|(name, a)| (name.as_str(), a))
    }

    /// Identity column.
    pub fn primary_key(&self) -> &str {
        self.primary_attribute()
            .map(|(_, a)| a.field.as_str())
            .unwrap_or(DEFAULT_PRIMARY_KEY)
    }

    /// Attribute whose column (or, failing that, whose name) is `field`.
    pub fn attribute_for_field(&self, field: &str) -> Option<&Attribute> {
        self.attributes
            .values()
            .find(|a| a.field == field)
            .or_else(|| self.attributes.get(field))
    }

    pub fn created_at(&self) -> Option<&Attribute> {
        self.attributes.get("createdAt").or_else(|| self.attributes.get("created_at"))
    }

    pub fn updated_at(&self) -> Option<&Attribute> {
        self.attributes.get("updatedAt").or_else(|| self.attributes.get("updated_at"))
    }

    pub fn hidden_fields(&self) -> impl Iterator<Item = &str> {
        self.attributes.values().filter(|a| a.hidden).map(|a| a.field.as_str())
    }

    /// Path parameter carrying this model's identity, e.g. "reportId".
    pub fn param_key(&self) -> String {
        param_key(&self.name)
    }

    pub fn table_name(&self) -> String {
        self.table.clone().unwrap_or_else(|| to_snake_case(&self.name))
    }

    pub fn schema_name(&self) -> &str {
        self.schema.as_deref().unwrap_or("public")
    }

    /// Every unique field set, the primary key first.
    pub fn unique_sets(&self) -> Vec<Vec<String>> {
        let mut sets = vec![vec![self.primary_key().to_string()]];
        sets.extend(self.unique.iter().cloned());
        sets
    }
}
