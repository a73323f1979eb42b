//! Validation-schema collaborator used by every resource.

mod validation;
pub(crate) use validation::coerce;
pub use validation::{FieldRule, FieldType, Schema};
