//! Weft Core
//!
//! Archetype storage and the task layer that iterates it:
//! - Entity Component System with chunked, type-erased columns
//! - Bounded work queue and worker threads
//! - Tasks with explicit dependencies
//! - Engine configuration

pub mod config;
pub mod ecs;
pub mod pool;
pub mod task;
pub mod work;

pub use config::{ConfigError, EngineConfig, StorageConfig, WorkConfig};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
