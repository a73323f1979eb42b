//! Request extractors.

pub mod query;

pub use query::{parse_query, NestedQuery};
