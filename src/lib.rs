//! orgtree: hierarchical tree engine for org charts and permission modules
//!
//! Layering (inner to outer): `domain` → `application` → `infrastructure` → `cli`.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
