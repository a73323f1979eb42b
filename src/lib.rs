//! Resource SDK: CRUD and collection HTTP endpoints generated from model descriptors.

pub mod case;
pub mod config;
pub mod error;
pub mod extractors;
pub mod factory;
pub mod filter;
pub mod resource;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod store;

pub use config::{load_model_str, load_models, Attribute, ModelDescriptor, Settings, SortDirection, SortSpec};
pub use error::{AppError, ConfigError, ErrorKind};
pub use factory::{FactoryOptions, ModelResource, ResourceFactory};
pub use filter::{Condition, Operator, WhereClause};
pub use resource::{
    logic_fn, Authenticator, BusinessLogic, HeaderToken, RawRequest, RequestContext, Resource, ResourceConfig,
    ResourceOptions, RouteConfig, Variant,
};
pub use response::CollectionPage;
pub use routes::{common_routes, ModelResourceOptions, ResourceServer, RouteInfo};
pub use service::{FieldRule, FieldType, Schema};
pub use store::{FindOptions, MemoryStore, ModelStore, PgStore, StoreError};
