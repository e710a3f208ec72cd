//! Runtime configuration for flowgraph-rs
//!
//! [`RuntimeConfig`] holds process-wide defaults for graph runs. It is read
//! from and written to TOML. Fields set in a graph config (`num_threads`,
//! `max_queue_size`) take precedence for that graph.
//!
//! # Example
//!
//! ```ignore
//! use flowgraph_rs::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::load_or_default("flowgraph.toml");
//! flowgraph_rs::logging::init_logging(&config.log_filter)?;
//! let graph = Graph::new(registry).with_runtime_config(config);
//! ```

use crate::error::{FlowGraphError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default bound on packets queued at a source's consumers
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;

/// Default tracing filter directive
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker threads per graph; 0 uses the available parallelism
    pub num_threads: usize,

    /// Queue length at which sources are throttled; 0 disables throttling
    pub max_queue_size: usize,

    /// `EnvFilter` directive used by [`init_logging`](crate::logging::init_logging)
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load a config from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FlowGraphError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            FlowGraphError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Load a config, returning defaults if the file is missing or invalid
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load runtime config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            FlowGraphError::Serialization(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(path.as_ref(), content)
            .map_err(|e| FlowGraphError::Config(format!("Failed to write config: {}", e)))
    }

    /// Worker count for a graph, applying a graph-level override.
    pub fn resolve_threads(&self, graph_override: Option<usize>) -> usize {
        match graph_override.unwrap_or(self.num_threads) {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        }
    }
}
