//! Mounting resources on an axum router.
//!
//! Paths use `{name}` segments (`/organizations/{organizationId}/reports/{reportId}`).
//! A collection is mounted on the path without its trailing segment; so is
//! create, since the identity does not exist yet. Resources allowing the
//! shortcut form answer on both the full and the trimmed path.

mod common;

pub use common::common_routes;

use crate::config::{ModelDescriptor, Settings};
use crate::error::{AppError, ConfigError};
use crate::extractors::NestedQuery;
use crate::factory::{FactoryOptions, ResourceFactory};
use crate::resource::{Authenticator, RawRequest, Resource, ResourceKind, ResourceOptions, Variant};
use crate::store::ModelStore;
use axum::body::Bytes;
use axum::extract::rejection::PathRejection;
use axum::extract::Path;
use axum::http::{HeaderMap, Method};
use axum::response::IntoResponse;
use axum::routing::{MethodFilter, MethodRouter};
use axum::Router;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

/// One mounted route, as reported by [`ResourceServer::inspect`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub method: String,
    pub path: String,
    pub variant: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
}

/// Which endpoints [`ResourceServer::add_model_resource`] generates. Partial is opt-in.
#[derive(Clone, Debug)]
pub struct ModelResourceOptions {
    pub create: bool,
    pub read: bool,
    pub update: bool,
    pub partial: bool,
    pub delete: bool,
    pub collection: bool,
    pub factory: FactoryOptions,
}

impl Default for ModelResourceOptions {
    fn default() -> Self {
        ModelResourceOptions {
            create: true,
            read: true,
            update: true,
            partial: false,
            delete: true,
            collection: true,
            factory: FactoryOptions::default(),
        }
    }
}

impl ModelResourceOptions {
    pub fn new(factory: FactoryOptions) -> Self {
        ModelResourceOptions {
            factory,
            ..Default::default()
        }
    }

    pub fn enables(&self, variant: Variant) -> bool {
        match variant {
            Variant::Create => self.create,
            Variant::Read => self.read,
            Variant::Update => self.update,
            Variant::Partial => self.partial,
            Variant::Delete => self.delete,
            Variant::Collection => self.collection,
        }
    }
}

struct Mount {
    path: String,
    resource: Resource,
}

pub struct ResourceServer {
    settings: Arc<Settings>,
    authenticators: HashMap<String, Arc<dyn Authenticator>>,
    mounts: Vec<Mount>,
    routes: Vec<RouteInfo>,
}

impl ResourceServer {
    pub fn new(settings: Arc<Settings>) -> Self {
        ResourceServer {
            settings,
            authenticators: HashMap::new(),
            mounts: Vec::new(),
            routes: Vec::new(),
        }
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.clone()
    }

    /// Register an auth strategy. Resources naming it must be added afterwards.
    pub fn add_authenticator(&mut self, name: impl Into<String>, authenticator: Arc<dyn Authenticator>) {
        self.authenticators.insert(name.into(), authenticator);
    }

    /// Mount one resource on the path(s) its variant resolves `path` to.
    pub fn add_route(&mut self, path: &str, resource: Resource) -> Result<(), ConfigError> {
        let resource = match resource.config().auth.clone() {
            Some(name) => {
                let authenticator = self
                    .authenticators
                    .get(&name)
                    .cloned()
                    .ok_or(ConfigError::UnknownAuthStrategy(name))?;
                resource.with_authenticator(authenticator)
            }
            None => resource,
        };

        let method = resource.variant().method();
        for mount_path in resolve_paths(&resource, path) {
            let axum_path = to_axum_path(&mount_path);
            let shape = route_shape(&axum_path);
            // axum rejects the same shape under different parameter names
            let clash = self.mounts.iter().any(|m| {
                route_shape(&m.path) == shape
                    && (m.path != axum_path || m.resource.variant().method() == method)
            });
            if clash {
                return Err(ConfigError::DuplicateRoute {
                    method: method.to_string(),
                    path: mount_path,
                });
            }
            tracing::info!(method = %method, path = %mount_path, variant = resource.variant().name(), "route mounted");
            self.routes.push(RouteInfo {
                method: method.to_string(),
                path: mount_path,
                variant: resource.variant().name().to_string(),
                auth: resource.config().auth.clone(),
            });
            self.mounts.push(Mount {
                path: axum_path,
                resource: resource.clone(),
            });
        }
        Ok(())
    }

    /// Mount a cluster of resources on one path. `defaults` fill options the
    /// resources leave unset.
    pub fn add_resource(
        &mut self,
        path: &str,
        cluster: Vec<Resource>,
        defaults: &ResourceOptions,
    ) -> Result<(), ConfigError> {
        for resource in cluster {
            self.add_route(path, resource.with_defaults(defaults))?;
        }
        Ok(())
    }

    /// Generate and mount the CRUD endpoints of a model backed by `store`.
    pub fn add_model_resource(
        &mut self,
        path: &str,
        model: Arc<ModelDescriptor>,
        store: Arc<dyn ModelStore>,
        options: ModelResourceOptions,
    ) -> Result<(), ConfigError> {
        crate::config::validate(&model)?;
        let factory = ResourceFactory::new(model, store);
        let cluster: Vec<Resource> = Variant::ALL
            .into_iter()
            .filter(|v| options.enables(*v))
            .map(|v| factory.build(v, options.factory.clone()).into_resource(self.settings.clone()))
            .collect();
        self.add_resource(path, cluster, &ResourceOptions::default())
    }

    pub fn inspect(&self) -> Vec<RouteInfo> {
        self.routes.clone()
    }

    pub fn into_router(self) -> Router {
        let mut by_path: BTreeMap<String, MethodRouter> = BTreeMap::new();
        for mount in self.mounts {
            let filter = method_filter(&mount.resource.variant().method());
            let has_params = mount.path.split('/').any(|seg| seg.starts_with(':'));
            let resource = mount.resource;
            let handler = move |params: Result<Path<HashMap<String, String>>, PathRejection>,
                                NestedQuery(query): NestedQuery,
                                headers: HeaderMap,
                                body: Bytes| {
                let resource = resource.clone();
                async move {
                    let params = match params {
                        Ok(Path(params)) => params,
                        Err(rejection) if has_params => {
                            tracing::warn!(error = %rejection, "path parameters rejected");
                            return AppError::BadRequest(format!("invalid path parameters: {}", rejection.body_text()))
                                .into_response();
                        }
                        Err(_) => HashMap::new(),
                    };
                    resource
                        .handle(RawRequest {
                            params,
                            query,
                            headers,
                            body,
                        })
                        .await
                }
            };
            let entry = by_path.remove(&mount.path).unwrap_or_default();
            by_path.insert(mount.path, entry.on(filter, handler));
        }

        let mut router = Router::new();
        for (path, method_router) in by_path {
            router = router.route(&path, method_router);
        }
        router
            .merge(common_routes(self.settings.clone()))
            .layer(RequestBodyLimitLayer::new(self.settings.body_limit))
    }
}

fn method_filter(method: &Method) -> MethodFilter {
    match *method {
        Method::POST => MethodFilter::POST,
        Method::PUT => MethodFilter::PUT,
        Method::PATCH => MethodFilter::PATCH,
        Method::DELETE => MethodFilter::DELETE,
        _ => MethodFilter::GET,
    }
}

/// Paths a resource answers on, in `{name}` form.
fn resolve_paths(resource: &Resource, path: &str) -> Vec<String> {
    let trimmed = trim_last_segment(path);
    match (resource.variant().kind(), resource.variant()) {
        (ResourceKind::Collection, _) | (_, Variant::Create) => vec![trimmed],
        _ if resource.config().allow_shortcut && trimmed != path => vec![path.to_string(), trimmed],
        _ => vec![path.to_string()],
    }
}

fn trim_last_segment(path: &str) -> String {
    let path = path.trim_end_matches('/');
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

/// `/reports/:reportId` -> `/reports/:`.
fn route_shape(axum_path: &str) -> String {
    axum_path
        .split('/')
        .map(|seg| if seg.starts_with(':') { ":" } else { seg })
        .collect::<Vec<_>>()
        .join("/")
}

/// `{organizationId}` -> `:organizationId`.
fn to_axum_path(path: &str) -> String {
    path.split('/')
        .map(|seg| match seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => format!(":{}", name.trim_end_matches('?')),
            None => seg.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}
