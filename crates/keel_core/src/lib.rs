//! Keel Engine Core
//!
//! Contains the storage and query engine of the engine:
//! - Entity Component System (archetype tables, migration, queries)
//! - Deferred post-frame mutation
//! - Pooled array storage
//! - Scene configuration

pub mod config;
pub mod ecs;
pub mod pool;

pub use config::{ConfigError, SceneConfig};
pub use keel_metrics as metrics;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
