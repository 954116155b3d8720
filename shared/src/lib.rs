pub mod error;
pub mod models;
pub mod validation;

pub use error::FaultKind;
pub use models::*;
pub use validation::*;
