//! Resource options (caller-supplied) and the resolved, immutable configuration.

use super::context::RequestContext;
use super::variant::{ResourceKind, Variant};
use crate::config::Settings;
use crate::error::AppError;
use crate::service::{FieldRule, Schema};
use axum::http::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Reshapes a business-logic result into the response body.
pub type ResultFormatter = Arc<dyn Fn(&RequestContext, Value) -> Result<Value, AppError> + Send + Sync>;

/// Options for one resource. Every field is optional; unset fields fall back
/// to cluster defaults, then to the variant's defaults, then to [`Settings`].
#[derive(Clone, Default)]
pub struct ResourceOptions {
    pub query: Option<Schema>,
    pub params: Option<Schema>,
    pub payload: Option<Schema>,
    /// Name of a registered authenticator.
    pub auth: Option<String>,
    pub status: Option<StatusCode>,
    pub formatter: Option<ResultFormatter>,
    pub allow_shortcut: Option<bool>,
    /// Collection page size when the request gives no `limit`.
    pub default_limit: Option<u32>,
}

impl ResourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, schema: Schema) -> Self {
        self.query = Some(schema);
        self
    }

    pub fn params(mut self, schema: Schema) -> Self {
        self.params = Some(schema);
        self
    }

    pub fn payload(mut self, schema: Schema) -> Self {
        self.payload = Some(schema);
        self
    }

    pub fn auth(mut self, strategy: impl Into<String>) -> Self {
        self.auth = Some(strategy.into());
        self
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn formatter<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext, Value) -> Result<Value, AppError> + Send + Sync + 'static,
    {
        self.formatter = Some(Arc::new(f));
        self
    }

    pub fn allow_shortcut(mut self, allow: bool) -> Self {
        self.allow_shortcut = Some(allow);
        self
    }

    pub fn default_limit(mut self, limit: u32) -> Self {
        self.default_limit = Some(limit);
        self
    }

    /// Fill every unset field from `defaults`; fields set on `self` win.
    pub fn merged_over(self, defaults: &ResourceOptions) -> ResourceOptions {
        ResourceOptions {
            query: self.query.or_else(|| defaults.query.clone()),
            params: self.params.or_else(|| defaults.params.clone()),
            payload: self.payload.or_else(|| defaults.payload.clone()),
            auth: self.auth.or_else(|| defaults.auth.clone()),
            status: self.status.or(defaults.status),
            formatter: self.formatter.or_else(|| defaults.formatter.clone()),
            allow_shortcut: self.allow_shortcut.or(defaults.allow_shortcut),
            default_limit: self.default_limit.or(defaults.default_limit),
        }
    }
}

impl fmt::Debug for ResourceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceOptions")
            .field("query", &self.query)
            .field("params", &self.params)
            .field("payload", &self.payload)
            .field("auth", &self.auth)
            .field("status", &self.status)
            .field("formatter", &self.formatter.as_ref().map(|_| "<fn>"))
            .field("allow_shortcut", &self.allow_shortcut)
            .field("default_limit", &self.default_limit)
            .finish()
    }
}

/// Per-section schemas checked before business logic runs.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ValidateConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Schema>,
}

/// What the router needs to mount a resource.
#[derive(Clone, Debug, Serialize)]
pub struct RouteConfig {
    #[serde(serialize_with = "serialize_method")]
    pub method: Method,
    pub validate: ValidateConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
}

fn serialize_method<S: serde::Serializer>(method: &Method, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(method.as_str())
}

/// Configuration of one resource instance, fixed at construction.
#[derive(Clone)]
pub struct ResourceConfig {
    pub variant: Variant,
    pub validate: ValidateConfig,
    pub auth: Option<String>,
    pub status: StatusCode,
    /// Instance-level formatter; the variant's formatter is used when unset.
    pub formatter: Option<ResultFormatter>,
    pub allow_shortcut: bool,
    pub default_limit: u32,
}

impl ResourceConfig {
    /// Resolve `options` against the variant's defaults and the process settings.
    pub fn build(variant: Variant, settings: &Settings, options: ResourceOptions) -> ResourceConfig {
        let options = options.merged_over(&variant.default_options());
        let status = options
            .status
            .or_else(|| variant.default_status())
            .unwrap_or(settings.default_status);
        let default_limit = options
            .default_limit
            .unwrap_or(settings.default_limit)
            .clamp(1, settings.max_limit.max(1));

        let query = match variant.kind() {
            ResourceKind::Collection => {
                let paging = collection_query_rules(default_limit, settings.max_limit);
                Some(options.query.unwrap_or_default().merge(&paging))
            }
            ResourceKind::Resource => options.query,
        };

        ResourceConfig {
            variant,
            validate: ValidateConfig {
                query,
                params: options.params,
                payload: options.payload,
            },
            auth: options.auth,
            status,
            formatter: options.formatter,
            allow_shortcut: options.allow_shortcut.unwrap_or(false),
            default_limit,
        }
    }

    pub fn route_config(&self) -> RouteConfig {
        RouteConfig {
            method: self.variant.method(),
            validate: self.validate.clone(),
            auth: self.auth.clone(),
        }
    }
}

impl fmt::Debug for ResourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceConfig")
            .field("variant", &self.variant)
            .field("validate", &self.validate)
            .field("auth", &self.auth)
            .field("status", &self.status)
            .field("formatter", &self.formatter.as_ref().map(|_| "<fn>"))
            .field("allow_shortcut", &self.allow_shortcut)
            .field("default_limit", &self.default_limit)
            .finish()
    }
}

/// Highest page accepted. With any `u32` limit the row offset stays within `i64`.
pub const MAX_PAGE: u32 = i32::MAX as u32;

fn collection_query_rules(default_limit: u32, max_limit: u32) -> Schema {
    Schema::new()
        .field(
            "page",
            FieldRule::integer()
                .default_value(1)
                .min(1.0)
                .max(f64::from(MAX_PAGE)),
        )
        .field(
            "limit",
            FieldRule::integer()
                .default_value(default_limit)
                .min(1.0)
                .max(f64::from(max_limit)),
        )
        .field("where", FieldRule::object())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::FieldType;

    #[test]
    fn caller_options_override_variant_defaults() {
        let settings = Settings::default();
        let cfg = ResourceConfig::build(Variant::Delete, &settings, ResourceOptions::new());
        assert_eq!(cfg.status, StatusCode::NO_CONTENT);
        assert!(!cfg.allow_shortcut);

        let cfg = ResourceConfig::build(
            Variant::Delete,
            &settings,
            ResourceOptions::new().status(StatusCode::OK).allow_shortcut(true),
        );
        assert_eq!(cfg.status, StatusCode::OK);
        assert!(cfg.allow_shortcut);
    }

    #[test]
    fn status_falls_back_to_settings() {
        let settings = Settings {
            default_status: StatusCode::ACCEPTED,
            ..Settings::default()
        };
        let cfg = ResourceConfig::build(Variant::Read, &settings, ResourceOptions::new());
        assert_eq!(cfg.status, StatusCode::ACCEPTED);
    }

    #[test]
    fn collection_adds_paging_rules_over_caller_query() {
        let settings = Settings::default();
        let options = ResourceOptions::new()
            .default_limit(20)
            .query(Schema::new().field("limit", FieldRule::string()).field("q", FieldRule::string()));
        let cfg = ResourceConfig::build(Variant::Collection, &settings, options);
        let query = cfg.validate.query.unwrap();
        assert_eq!(query.get("limit").unwrap().type_, FieldType::Integer);
        assert_eq!(query.get("limit").unwrap().default, Some(serde_json::json!(20)));
        assert!(query.contains("q"));
        assert!(query.contains("where"));
    }

    #[test]
    fn default_limit_is_bounded_by_max_limit() {
        let settings = Settings {
            max_limit: 50,
            ..Settings::default()
        };
        let cfg = ResourceConfig::build(Variant::Collection, &settings, ResourceOptions::new().default_limit(500));
        assert_eq!(cfg.default_limit, 50);
    }

    #[test]
    fn page_is_capped_so_offsets_fit_bigint() {
        let cfg = ResourceConfig::build(Variant::Collection, &Settings::default(), ResourceOptions::new());
        let query = cfg.validate.query.unwrap();
        let ok = serde_json::json!({ "page": MAX_PAGE.to_string(), "limit": "1000" });
        assert!(query.validate("query", &ok).is_ok());
        let too_far = serde_json::json!({ "page": "9223372036854775807" });
        assert!(query.validate("query", &too_far).is_err());
        assert!(u64::from(MAX_PAGE) * u64::from(u32::MAX) <= i64::MAX as u64);
    }

    #[test]
    fn merged_over_keeps_set_fields() {
        let cluster = ResourceOptions::new().auth("token").status(StatusCode::CREATED);
        let merged = ResourceOptions::new().status(StatusCode::OK).merged_over(&cluster);
        assert_eq!(merged.status, Some(StatusCode::OK));
        assert_eq!(merged.auth.as_deref(), Some("token"));
    }
}
