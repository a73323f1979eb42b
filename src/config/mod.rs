pub mod loader;
pub mod model;
pub mod settings;
pub mod validator;

pub use loader::*;
pub use model::*;
pub use settings::*;
pub use validator::*;
