//! Application layer: services and use cases
//!
//! This layer orchestrates domain logic and owns the versioned tree state.

pub mod error;
pub mod error_ext;
pub mod services;

pub use error::{ApplicationError, ApplicationResult};
pub use error_ext::{IoResultExt, JsonResultExt};
