//! Domain layer: tree store and engine components
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod builder;
pub mod cascade;
pub mod engine;
pub mod error;
pub mod impact;
pub mod layout;
pub mod node;
pub mod render;
pub mod validator;

pub use arena::TreeStore;
pub use builder::{NodeRecord, TreeBuilder, TreeSnapshot};
pub use cascade::{CascadeEngine, CascadePolicy, ModuleToggle, NodeState, StateChange};
pub use engine::{EngineConfig, TreeEngine};
pub use error::{DomainError, DomainResult};
pub use impact::{DeleteImpact, ImpactAnalyzer};
pub use layout::{Edge, Layout, LayoutConfig, LayoutEngine, Point};
pub use node::*;
pub use render::TreeRender;
pub use validator::{MovePolicy, MoveValidator, ReparentPlan};
