//! Error handling for flowgraph-rs
//!
//! Crate-level errors cover configuration files and setup. Errors raised
//! while building or running a graph are [`PipelineError`]s and convert
//! into [`FlowGraphError::Pipeline`].

use crate::pipeline::PipelineError;
use thiserror::Error;

/// Main error type for flowgraph-rs operations
#[derive(Error, Debug)]
pub enum FlowGraphError {
    /// Errors from building or running a graph
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors while installing the tracing subscriber
    #[error("Logging error: {0}")]
    Logging(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<FlowGraphError>,
    },
}

impl FlowGraphError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        FlowGraphError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for flowgraph-rs operations
pub type Result<T> = std::result::Result<T, FlowGraphError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, PipelineError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| FlowGraphError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| FlowGraphError::from(e).with_context(f()))
    }
}
