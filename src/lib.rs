//! # flowgraph-rs: timestamp-synchronized dataflow graphs
//!
//! A runtime for graphs of calculators connected by timestamped packet
//! streams. Graphs are described in a protobuf-like text format, JSON or TOML,
//! compiled against a [`CalculatorRegistry`](pipeline::CalculatorRegistry)
//! and executed on a worker pool.
//!
//! ## Architecture
//!
//! - **Pipeline**: graph configs, compiler, scheduler and the built-in
//!   calculators
//! - **Image**: CPU image frames and resampling used by the image calculators
//! - **Config**: runtime defaults (thread count, queue limits, log filter)
//! - **Logging**: `tracing` subscriber setup
//!
//! ## Example
//!
//! ```ignore
//! use flowgraph_rs::pipeline::{CalculatorRegistry, Graph, GraphConfig, Packet};
//! use std::{collections::HashMap, sync::Arc};
//!
//! let config = GraphConfig::parse_text(r#"
//!     input_stream: "in"
//!     output_stream: "out"
//!     node {
//!       calculator: "PassThroughCalculator"
//!       input_stream: "in"
//!       output_stream: "out"
//!     }
//! "#)?;
//!
//! let mut graph = Graph::new(Arc::new(CalculatorRegistry::with_builtins()));
//! graph.initialize(config)?;
//! let poller = graph.add_output_stream_poller("out")?;
//! graph.start_run(HashMap::new())?;
//! graph.add_packet_to_input_stream("in", Packet::new(0.5f64).at(0))?;
//! graph.close_all_input_streams()?;
//! for packet in poller.iter() {
//!     println!("{} {:?}", packet.timestamp(), packet.get::<f64>());
//! }
//! graph.wait_until_done()?;
//! ```

pub mod config;
pub mod error;
pub mod image;
pub mod logging;
pub mod pipeline;

// Re-export commonly used types
pub use config::RuntimeConfig;
pub use error::{FlowGraphError, Result, ResultExt};
pub use pipeline::{
    Calculator, CalculatorContext, CalculatorRegistry, Graph, GraphConfig, Packet, PipelineError,
    PipelineResult, ProcessStatus, Timestamp,
};
