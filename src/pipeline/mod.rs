//! Timestamp-synchronized dataflow graphs.
//!
//! A graph is a DAG of calculators connected by named streams. Every packet
//! carries a timestamp; a calculator is invoked once per timestamp with the
//! packets of all its inputs at that timestamp, empty markers standing in for
//! inputs that had nothing.
//!
//! # Architecture
//!
//! ```text
//! GraphConfig ──► GraphCompiler ──► CompiledGraph ──► Graph (executor)
//!  (text/JSON/TOML)   (registry,        (streams,        │
//!                      subgraphs,        topo order)     ├──► worker pool
//!                      type checks)                      │     └─► Calculator::process
//!                                                        ├──► OutputStreamPoller
//!                                                        └──► OutputObserver
//! ```
//!
//! # Design
//!
//! - **Enum dispatch for built-ins**: `BuiltinCalculator` covers the calculators
//!   shipped with the crate; `Box<dyn Calculator>` is used only for plugins.
//! - **Index ids**: nodes and streams are addressed by `NodeId`/`StreamId`,
//!   direct indices into the compiled graph.
//! - **Bounds, not polling**: each input stream tracks a timestamp bound, so a
//!   node runs as soon as no earlier packet can reach any of its inputs.
//! - **One lock**: run state sits behind a single mutex; calculators run
//!   outside it on worker threads and never concurrently with themselves.
//! - **Explicit registry**: calculators and subgraphs are registered on a
//!   `CalculatorRegistry` value passed to the graph.

pub mod bridge;
pub mod compiled_plan;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod frontier;
pub mod graph_config;
pub mod id;
pub mod node;
pub mod node_type;
pub mod nodes;
pub mod packet;
pub mod port;
pub mod registry;
pub mod stream;
pub mod text_format;
pub mod timestamp;

pub use bridge::{GraphInputHandle, OutputObserver, OutputStreamPoller};
pub use compiled_plan::{CompiledGraph, CompiledNode, PlanStats, StreamInfo, StreamProducer};
pub use compiler::GraphCompiler;
pub use error::{PipelineError, PipelineResult};
pub use executor::{Graph, RunStats};
pub use frontier::{InputSyncSet, Readiness};
pub use graph_config::{GraphConfig, NodeConfig, NodeOptions, StreamRef};
pub use id::{InputPortId, NodeId, StreamId};
pub use node::{
    AnyCalculator, BuiltinCalculator, Calculator, CalculatorContext, NodeLifecycle, ProcessStatus,
};
pub use node_type::CalculatorKind;
pub use packet::{Packet, PacketType};
pub use port::{Contract, PortDescriptor, PortDirection, TagMap};
pub use registry::{CalculatorRegistry, Registration};
pub use stream::Stream;
pub use timestamp::{Timestamp, TimestampDiff};
