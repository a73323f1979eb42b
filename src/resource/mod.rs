//! Resource execution pipeline.
//!
//! A [`Resource`] is built once per route from a [`Variant`], its options and
//! a [`BusinessLogic`]. Every request runs the same stages in order:
//!
//! 1. the variant's before hook (may rewrite the payload),
//! 2. payload validation,
//! 3. business logic,
//! 4. the variant's after hook (post-conditions),
//! 5. the result formatter (instance override, else the variant's).
//!
//! Any stage may fail; later stages then do not run. Failures that are not
//! already classified are wrapped as internal errors before they surface.

pub mod auth;
pub mod config;
pub mod context;
pub mod logic;
pub mod variant;

pub use auth::{Authenticator, HeaderToken};
pub use config::{ResourceConfig, ResourceOptions, ResultFormatter, RouteConfig, ValidateConfig};
pub use context::RequestContext;
pub use logic::{logic_fn, BusinessLogic, LogicFn};
pub use variant::{is_falsy, ResourceKind, Variant};

use crate::config::Settings;
use crate::error::AppError;
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Request as the router hands it over: raw path params, decoded query, body bytes.
#[derive(Debug, Default)]
pub struct RawRequest {
    pub params: HashMap<String, String>,
    pub query: Map<String, Value>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Clone)]
pub struct Resource {
    settings: Arc<Settings>,
    options: ResourceOptions,
    config: Arc<ResourceConfig>,
    logic: Arc<dyn BusinessLogic>,
    authenticator: Option<Arc<dyn Authenticator>>,
    span: tracing::Span,
}

impl Resource {
    pub fn new<L>(variant: Variant, settings: Arc<Settings>, options: ResourceOptions, logic: L) -> Self
    where
        L: BusinessLogic + 'static,
    {
        Self::with_logic(variant, settings, options, Arc::new(logic))
    }

    pub fn with_logic(
        variant: Variant,
        settings: Arc<Settings>,
        options: ResourceOptions,
        logic: Arc<dyn BusinessLogic>,
    ) -> Self {
        let config = Arc::new(ResourceConfig::build(variant, &settings, options.clone()));
        let span = tracing::info_span!("resource", resource_id = %Uuid::new_v4(), variant = variant.name());
        Resource {
            settings,
            options,
            config,
            logic,
            authenticator: None,
            span,
        }
    }

    /// Resource whose business logic is an async closure.
    pub fn from_fn<F, Fut, T>(variant: Variant, settings: Arc<Settings>, options: ResourceOptions, f: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T, AppError>> + Send + 'static,
        T: serde::Serialize + Send + 'static,
    {
        Self::new(variant, settings, options, logic_fn(f))
    }

    /// Re-resolve the configuration with cluster-wide defaults under this resource's own options.
    pub fn with_defaults(mut self, defaults: &ResourceOptions) -> Self {
        self.options = self.options.merged_over(defaults);
        self.config = Arc::new(ResourceConfig::build(self.variant(), &self.settings, self.options.clone()));
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn variant(&self) -> Variant {
        self.config.variant
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    pub fn route_config(&self) -> RouteConfig {
        self.config.route_config()
    }

    pub fn status(&self) -> StatusCode {
        self.config.status
    }

    /// Run the pipeline on an already-validated context.
    pub async fn execute(&self, ctx: &mut RequestContext) -> Result<Value, AppError> {
        let variant = self.variant();
        variant.before_handler(ctx).map_err(AppError::classify)?;
        self.validate_payload(ctx)?;

        let result = self.logic.call(ctx).await.map_err(AppError::classify)?;

        variant.after_handler(ctx, &result).map_err(AppError::classify)?;

        let formatted = match &self.config.formatter {
            Some(formatter) => formatter(ctx, result),
            None => variant.format(ctx, result),
        };
        formatted.map_err(AppError::classify)
    }

    /// Validate, run the pipeline and answer. Every terminal failure is logged here once.
    pub async fn handle(&self, request: RawRequest) -> Response {
        let span = tracing::info_span!(parent: &self.span, "request", request_id = %Uuid::new_v4());
        async move {
            match self.run(request).await {
                Ok(value) => self.respond(value),
                Err(err) => {
                    let err = err.classify();
                    if err.status().is_server_error() {
                        tracing::error!(status = err.status().as_u16(), error = %err, "request failed");
                    } else {
                        tracing::warn!(status = err.status().as_u16(), error = %err, "request failed");
                    }
                    err.into_response()
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, request: RawRequest) -> Result<Value, AppError> {
        if let Some(authenticator) = &self.authenticator {
            authenticator.authenticate(&request.headers).await?;
        }
        let raw_params: Map<String, Value> = request
            .params
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        let params = match &self.config.validate.params {
            Some(schema) => schema.validate("params", &Value::Object(raw_params))?,
            None => raw_params,
        };
        let query = match &self.config.validate.query {
            Some(schema) => schema.validate("query", &Value::Object(request.query))?,
            None => request.query,
        };
        let payload = if request.body.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            serde_json::from_slice(&request.body)
                .map_err(|e| AppError::Validation(format!("payload is not valid JSON: {}", e)))?
        };
        let mut ctx = RequestContext::new(params, query, payload);
        self.execute(&mut ctx).await
    }

    fn validate_payload(&self, ctx: &mut RequestContext) -> Result<(), AppError> {
        let Some(schema) = &self.config.validate.payload else {
            return Ok(());
        };
        let validated = match self.variant() {
            Variant::Partial => schema.validate_partial("payload", &ctx.payload)?,
            _ => schema.validate("payload", &ctx.payload)?,
        };
        ctx.payload = Value::Object(validated);
        Ok(())
    }

    fn respond(&self, value: Value) -> Response {
        let status = self.config.status;
        if status == StatusCode::NO_CONTENT || value.is_null() {
            return status.into_response();
        }
        (status, Json(value)).into_response()
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("config", &self.config)
            .field("authenticated", &self.authenticator.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{FieldRule, Schema};
    use serde_json::json;
    use std::sync::Mutex;

    fn settings() -> Arc<Settings> {
        Arc::new(Settings::default())
    }

    #[tokio::test]
    async fn stages_run_in_order() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let logic_trace = trace.clone();
        let format_trace = trace.clone();
        let options = ResourceOptions::new().formatter(move |_ctx, result| {
            format_trace.lock().unwrap().push("format");
            Ok(json!({ "wrapped": result }))
        });
        let resource = Resource::from_fn(Variant::Read, settings(), options, move |_ctx| {
            let trace = logic_trace.clone();
            async move {
                trace.lock().unwrap().push("logic");
                Ok(json!({ "id": 1 }))
            }
        });
        let mut ctx = RequestContext::default();
        let out = resource.execute(&mut ctx).await.unwrap();
        assert_eq!(out, json!({ "wrapped": { "id": 1 } }));
        assert_eq!(*trace.lock().unwrap(), vec!["logic", "format"]);
    }

    #[tokio::test]
    async fn after_hook_failure_skips_formatter() {
        let formatted = Arc::new(Mutex::new(false));
        let flag = formatted.clone();
        let options = ResourceOptions::new().formatter(move |_ctx, result| {
            *flag.lock().unwrap() = true;
            Ok(result)
        });
        let resource = Resource::from_fn(Variant::Read, settings(), options, |_ctx| async { Ok(Value::Null) });
        let err = resource.execute(&mut RequestContext::default()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert!(!*formatted.lock().unwrap());
    }

    #[tokio::test]
    async fn unclassified_failures_become_internal() {
        let resource = Resource::from_fn(Variant::Create, settings(), ResourceOptions::new(), |_ctx| async {
            Err::<Value, _>(AppError::Store(crate::store::StoreError::Other("socket closed".into())))
        });
        let err = resource.execute(&mut RequestContext::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn partial_validates_the_unwrapped_payload() {
        let options = ResourceOptions::new().payload(
            Schema::new()
                .field("frequency", FieldRule::integer())
                .field("organizationId", FieldRule::integer().required()),
        );
        let resource = Resource::from_fn(Variant::Partial, settings(), options, |ctx| async move { Ok(ctx.payload) });
        let mut ctx = RequestContext::new(Map::new(), Map::new(), json!({ "operations": { "frequency": "5" } }));
        let out = resource.execute(&mut ctx).await.unwrap();
        assert_eq!(out, json!({ "frequency": 5 }));
    }

    #[tokio::test]
    async fn handle_validates_params_before_logic() {
        let options = ResourceOptions::new().params(Schema::new().field("reportId", FieldRule::integer().required()));
        let resource = Resource::from_fn(Variant::Read, settings(), options, |ctx| async move {
            Ok(json!({ "id": ctx.param("reportId").cloned() }))
        });
        let mut params = HashMap::new();
        params.insert("reportId".to_string(), "abc".to_string());
        let response = resource
            .handle(RawRequest {
                params,
                ..RawRequest::default()
            })
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
