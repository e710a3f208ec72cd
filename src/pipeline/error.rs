//! Pipeline-specific error types.
//!
//! Errors fall into three groups:
//!
//! - **Config errors** are returned by [`Graph::initialize`](super::Graph::initialize)
//!   and [`Graph::start_run`](super::Graph::start_run) before any node runs.
//! - **Run errors** (ordering violations, node failures) abort the whole run and
//!   are reported by [`Graph::wait_until_done`](super::Graph::wait_until_done).
//! - **Packet errors** are raised by typed packet reads. Inside a calculator they
//!   propagate with `?` and end up wrapped in [`PipelineError::NodeFailed`].

use crate::pipeline::timestamp::Timestamp;
use thiserror::Error;

/// Errors that can occur within the pipeline system.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Parse error at {line}:{column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Graph config error: {0}")]
    Config(String),

    #[error("Calculator '{0}' is not registered")]
    UnknownCalculator(String),

    #[error("Calculator '{0}' is already registered")]
    DuplicateCalculator(String),

    #[error("Stream '{0}' has no producer")]
    UnknownStream(String),

    #[error("Stream '{0}' is produced more than once")]
    DuplicateStream(String),

    #[error("Port mismatch: {0}")]
    PortMismatch(String),

    #[error("Type mismatch on stream '{stream}': {producer} produced, {consumer} expected")]
    StreamTypeMismatch {
        stream: String,
        producer: String,
        consumer: String,
    },

    #[error("Side packet '{0}' is not declared by the graph")]
    UnknownSidePacket(String),

    #[error("Side packet '{0}' was not supplied to start_run")]
    MissingSidePacket(String),

    #[error("Cycle detected in graph: {0}")]
    CycleDetected(String),

    #[error("Ordering violation on '{stream}': {timestamp} is not after {last}")]
    OrderingViolation {
        stream: String,
        timestamp: Timestamp,
        last: Timestamp,
    },

    #[error("Invalid timestamp {timestamp} on '{stream}'")]
    InvalidTimestamp { stream: String, timestamp: Timestamp },

    #[error("Stream '{0}' is closed")]
    StreamClosed(String),

    #[error("Packet type mismatch: expected {expected}, found {actual}")]
    PacketTypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Empty packet read as {expected}")]
    EmptyPacket { expected: &'static str },

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Node '{node}' failed: {source}")]
    NodeFailed {
        node: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("Node error: {0}")]
    Node(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Graph is not initialized")]
    NotInitialized,

    #[error("Graph is not running")]
    NotRunning,

    #[error("Graph has already been started")]
    AlreadyStarted,

    #[error("Graph run was cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Wraps an error raised by a calculator with the node's name.
    pub fn node_failed(node: impl Into<String>, source: PipelineError) -> Self {
        Self::NodeFailed {
            node: node.into(),
            source: Box::new(source),
        }
    }

    /// Returns `true` for errors detected while building or validating a graph.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. }
                | Self::Config(_)
                | Self::UnknownCalculator(_)
                | Self::DuplicateCalculator(_)
                | Self::UnknownStream(_)
                | Self::DuplicateStream(_)
                | Self::PortMismatch(_)
                | Self::StreamTypeMismatch { .. }
                | Self::UnknownSidePacket(_)
                | Self::MissingSidePacket(_)
                | Self::CycleDetected(_)
        )
    }

    /// The innermost error, looking through `NodeFailed` wrappers.
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            Self::NodeFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
