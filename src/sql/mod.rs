//! Safe SQL builder for the PostgreSQL store: identifiers quoted, values as parameters.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
