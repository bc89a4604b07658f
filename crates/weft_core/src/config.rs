//! Engine configuration
//!
//! Loaded from JSON by the runtime; every field has a default so partial
//! files are accepted.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub work: WorkConfig,
}

/// Chunked column sizing shared by every archetype of a world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Elements per chunk. Must be a non-zero power of two.
    pub chunk_size: usize,
    /// Wholly unused trailing chunks a column keeps around after removals.
    pub max_unused_chunks: usize,
}

/// Worker pool and queue sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkConfig {
    /// Number of worker threads. Zero means the submitting thread runs everything.
    pub worker_count: usize,
    /// Slots in the bounded work queue.
    pub queue_capacity: usize,
}

impl StorageConfig {
    pub const DEFAULT_CHUNK_SIZE: usize = 4096;
    pub const DEFAULT_MAX_UNUSED_CHUNKS: usize = 4;
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            max_unused_chunks: Self::DEFAULT_MAX_UNUSED_CHUNKS,
        }
    }
}

impl WorkConfig {
    pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
}

impl Default for WorkConfig {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism().map_or(1, |n| n.get()),
            queue_capacity: Self::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let chunk_size = self.storage.chunk_size;
        if chunk_size == 0 || !chunk_size.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "storage.chunk_size must be a non-zero power of two, got {chunk_size}"
            )));
        }
        if self.work.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "work.queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "storage": { "chunk_size": 256 } }"#)
            .expect("valid config");
        assert_eq!(config.storage.chunk_size, 256);
        assert_eq!(
            config.storage.max_unused_chunks,
            StorageConfig::DEFAULT_MAX_UNUSED_CHUNKS
        );
        assert_eq!(config.work.queue_capacity, WorkConfig::DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn rejects_non_power_of_two_chunks() {
        let err = EngineConfig::from_json_str(r#"{ "storage": { "chunk_size": 4094 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_empty_queue() {
        let err = EngineConfig::from_json_str(r#"{ "work": { "queue_capacity": 0 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn default_worker_count_is_positive() {
        assert!(WorkConfig::default().worker_count >= 1);
    }
}
