//! CRUD synthesis over a model descriptor and a store.
//!
//! [`ResourceFactory`] produces, per operation, the resource options and the
//! business logic that drives the [`ModelStore`]: where clauses from path
//! params and the `where` query filter, payloads with parent identity lifted
//! from the path, and store failures translated into conflicts and not-founds.

pub mod where_clause;

pub use where_clause::{collection_where, resource_bindings, resource_where};

use crate::case::param_key;
use crate::config::{ModelDescriptor, Settings, SortSpec};
use crate::error::AppError;
use crate::filter::{loose_eq, WhereClause};
use crate::resource::{BusinessLogic, RequestContext, Resource, ResourceOptions, Variant};
use crate::service::{coerce, FieldRule, FieldType, Schema};
use crate::store::{FindOptions, ModelStore, StoreError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct FactoryOptions {
    /// Name of the resource this one is nested under, e.g. "organization".
    pub parent_resource: Option<String>,
    /// Path parameters copied into the payload on create and update.
    pub payload_params: Vec<String>,
    /// Field -> path parameter bindings replacing the derived single-entity clause.
    pub where_resource: Option<BTreeMap<String, String>>,
    /// Fixed collection clause replacing the parent scope.
    pub where_collection: Option<WhereClause>,
    pub resource: ResourceOptions,
}

impl FactoryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent_resource(mut self, name: impl Into<String>) -> Self {
        self.parent_resource = Some(name.into());
        self
    }

    pub fn payload_param(mut self, param: impl Into<String>) -> Self {
        self.payload_params.push(param.into());
        self
    }

    pub fn where_resource(mut self, bindings: BTreeMap<String, String>) -> Self {
        self.where_resource = Some(bindings);
        self
    }

    pub fn where_collection(mut self, clause: WhereClause) -> Self {
        self.where_collection = Some(clause);
        self
    }

    pub fn resource(mut self, options: ResourceOptions) -> Self {
        self.resource = options;
        self
    }

    /// Path parameters lifted into the payload: the explicit ones plus the parent's identity.
    pub fn lifted_params(&self) -> Vec<String> {
        let mut params = self.payload_params.clone();
        if let Some(parent) = &self.parent_resource {
            let key = param_key(parent);
            if !params.contains(&key) {
                params.push(key);
            }
        }
        params
    }
}

/// Options and business logic for one generated endpoint.
pub struct ModelResource {
    pub variant: Variant,
    pub options: ResourceOptions,
    pub logic: ModelLogic,
}

impl ModelResource {
    pub fn into_resource(self, settings: Arc<Settings>) -> Resource {
        Resource::new(self.variant, settings, self.options, self.logic)
    }
}

#[derive(Clone)]
pub struct ResourceFactory {
    model: Arc<ModelDescriptor>,
    store: Arc<dyn ModelStore>,
}

impl ResourceFactory {
    pub fn new(model: Arc<ModelDescriptor>, store: Arc<dyn ModelStore>) -> Self {
        ResourceFactory { model, store }
    }

    pub fn model(&self) -> &ModelDescriptor {
        &self.model
    }

    pub fn create(&self, options: FactoryOptions) -> ModelResource {
        self.build(Variant::Create, options)
    }

    pub fn read(&self, options: FactoryOptions) -> ModelResource {
        self.build(Variant::Read, options)
    }

    pub fn update(&self, options: FactoryOptions) -> ModelResource {
        self.build(Variant::Update, options)
    }

    pub fn partial(&self, options: FactoryOptions) -> ModelResource {
        self.build(Variant::Partial, options)
    }

    pub fn delete(&self, options: FactoryOptions) -> ModelResource {
        self.build(Variant::Delete, options)
    }

    pub fn collection(&self, options: FactoryOptions) -> ModelResource {
        self.build(Variant::Collection, options)
    }

    pub fn build(&self, variant: Variant, options: FactoryOptions) -> ModelResource {
        let mut resource = options.resource.clone();
        if matches!(variant, Variant::Create | Variant::Update | Variant::Partial) && resource.payload.is_none() {
            resource.payload = self.derived_payload(variant, &options);
        }
        let logic = ModelLogic {
            variant,
            model: self.model.clone(),
            store: self.store.clone(),
            payload_rules: resource.payload.clone(),
            options,
        };
        ModelResource {
            variant,
            options: resource,
            logic,
        }
    }

    /// Payload schema from the model's validation. Lifted slots are filled from
    /// the path, so they are not required from the client. Updates also require
    /// the identity field.
    fn derived_payload(&self, variant: Variant, options: &FactoryOptions) -> Option<Schema> {
        let mut schema = self.model.validation.clone()?;
        for key in options.lifted_params() {
            if let Some(rule) = schema.get_mut(&key) {
                rule.required = false;
            }
        }
        if variant != Variant::Create {
            let pk = self.model.primary_key();
            if !schema.contains(pk) {
                let type_ = self
                    .model
                    .primary_attribute()
                    .and_then(|(_, a)| a.type_)
                    .unwrap_or(FieldType::Any);
                schema.insert(pk, FieldRule::of(type_).required());
            }
        }
        Some(schema)
    }
}

/// Generated business logic for one operation on one model.
pub struct ModelLogic {
    variant: Variant,
    model: Arc<ModelDescriptor>,
    store: Arc<dyn ModelStore>,
    options: FactoryOptions,
    payload_rules: Option<Schema>,
}

impl ModelLogic {
    /// Public shape of a record: hidden attributes removed.
    fn to_endpoint(&self, mut record: Value) -> Value {
        if let Value::Object(map) = &mut record {
            for field in self.model.hidden_fields() {
                map.remove(field);
            }
        }
        record
    }

    fn store_error(&self, err: StoreError) -> AppError {
        match err {
            e if e.is_unique_violation() => {
                tracing::debug!(model = %self.model.name, error = %e, "unique violation");
                AppError::Conflict(format!(
                    "A {} already exists with the supplied information",
                    self.model.name.to_lowercase()
                ))
            }
            StoreError::Gone => AppError::NotFound(format!("{} not found", self.model.name)),
            StoreError::KeyRange(n) => AppError::BadRequest(format!(
                "{} is out of range for {}.{}",
                n,
                self.model.name,
                self.model.primary_key()
            )),
            e => AppError::Store(e),
        }
    }

    fn lift_value(&self, key: &str, value: &Value) -> Result<Value, AppError> {
        if !value.is_string() {
            return Ok(value.clone());
        }
        let declared = self
            .model
            .attribute_for_field(key)
            .and_then(|a| a.type_)
            .or_else(|| self.payload_rules.as_ref().and_then(|s| s.get(key)).map(|r| r.type_));
        match declared {
            Some(type_) if type_ != FieldType::Any => coerce("params", key, value, type_),
            _ => Ok(value.clone()),
        }
    }

    /// Request payload with the lifted path parameters written over it.
    fn assemble_payload(&self, ctx: &RequestContext) -> Result<Map<String, Value>, AppError> {
        let mut payload = match &ctx.payload {
            Value::Object(m) => m.clone(),
            Value::Null => Map::new(),
            _ => return Err(AppError::Validation("payload must be an object".into())),
        };
        for key in self.options.lifted_params() {
            if let Some(value) = ctx.params.get(&key) {
                payload.insert(key.clone(), self.lift_value(&key, value)?);
            }
        }
        Ok(payload)
    }

    fn sort_order(&self) -> Vec<SortSpec> {
        if !self.model.sorting.is_empty() {
            return self.model.sorting.clone();
        }
        self.model
            .created_at()
            .map(|attr| vec![SortSpec::asc(attr.field.clone())])
            .unwrap_or_default()
    }

    async fn create(&self, ctx: &RequestContext) -> Result<Value, AppError> {
        let payload = self.assemble_payload(ctx)?;
        let record = self.store.create(payload).await.map_err(|e| self.store_error(e))?;
        Ok(self.to_endpoint(record))
    }

    async fn read(&self, ctx: &RequestContext) -> Result<Value, AppError> {
        let clause = resource_where(&self.model, &ctx.params, &self.options)?;
        let found = self.store.find_one(&clause).await?;
        Ok(found.map(|r| self.to_endpoint(r)).unwrap_or(Value::Null))
    }

    async fn update(&self, ctx: &RequestContext) -> Result<Value, AppError> {
        let bindings = resource_bindings(&self.model, &ctx.params, &self.options);
        let clause = resource_where(&self.model, &ctx.params, &self.options)?;
        let payload = self.assemble_payload(ctx)?;

        for (field, param) in &bindings {
            let matches = match (ctx.params.get(param), payload.get(field)) {
                (Some(expected), Some(actual)) => loose_eq(expected, actual),
                (None, None) => true,
                (Some(_), None) => self.variant == Variant::Partial,
                (None, Some(_)) => false,
            };
            if !matches {
                return Err(AppError::BadRequest(
                    "One or more payload values do not match the requested resource".into(),
                ));
            }
        }

        let found = self
            .store
            .find_one(&clause)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} not found", self.model.name)))?;
        ctx.set_before_snapshot(found.clone())?;
        let updated = self
            .store
            .update(&found, payload)
            .await
            .map_err(|e| self.store_error(e))?;
        Ok(self.to_endpoint(updated))
    }

    async fn delete(&self, ctx: &RequestContext) -> Result<Value, AppError> {
        let clause = resource_where(&self.model, &ctx.params, &self.options)?;
        let found = self
            .store
            .find_one(&clause)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} not found", self.model.name)))?;
        let deleted = self.store.destroy(&found).await.map_err(|e| self.store_error(e))?;
        Ok(self.to_endpoint(deleted))
    }

    async fn collection(&self, ctx: &RequestContext) -> Result<Value, AppError> {
        let filter = collection_where(&self.model, &ctx.params, &ctx.query, &self.options)?;
        let limit = ctx.query_u64("limit");
        let page = ctx.query_u64("page").unwrap_or(1).max(1);
        let offset = limit.map(|l| (page - 1).saturating_mul(l)).unwrap_or(0);
        let options = FindOptions {
            filter,
            limit,
            offset,
            order: self.sort_order(),
        };
        let records = self.store.find_all(&options).await?;
        Ok(Value::Array(records.into_iter().map(|r| self.to_endpoint(r)).collect()))
    }
}

#[async_trait]
impl BusinessLogic for ModelLogic {
    async fn call(&self, ctx: &RequestContext) -> Result<Value, AppError> {
        match self.variant {
            Variant::Create => self.create(ctx).await,
            Variant::Read => self.read(ctx).await,
            Variant::Update | Variant::Partial => self.update(ctx).await,
            Variant::Delete => self.delete(ctx).await,
            Variant::Collection => self.collection(ctx).await,
        }
    }
}
