//! Infrastructure layer: persistence and DI container
//!
//! This layer implements the storage boundary and wires up services.

pub mod di;
pub mod error;
pub mod traits;

pub use error::{InfraError, InfraResult};
pub use traits::{lock_path, InMemoryRepository, JsonFileRepository, TreeRepository};
