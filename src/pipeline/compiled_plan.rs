use crate::pipeline::graph_config::NodeOptions;
use crate::pipeline::id::{InputPortId, NodeId, StreamId};
use crate::pipeline::packet::PacketType;
use crate::pipeline::port::Contract;
use crate::pipeline::registry::Registration;
use std::collections::HashMap;
use std::sync::Arc;

/// Validated, fully wired graph ready to be run.
///
/// Produced by [`GraphCompiler`](super::compiler::GraphCompiler). Subgraphs are
/// already expanded, every stream has exactly one producer and every
/// connection is type-checked.
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    /// Nodes indexed by `NodeId`
    pub nodes: Vec<CompiledNode>,

    /// Streams indexed by `StreamId`
    pub streams: Vec<StreamInfo>,

    /// All nodes, producers before consumers
    pub topological_order: Vec<NodeId>,

    /// Graph input streams in declaration order
    pub graph_inputs: Vec<StreamId>,

    /// Graph output streams in declaration order
    pub graph_outputs: Vec<StreamId>,

    /// Side packets declared by the graph
    pub side_packets: Vec<SidePacketInfo>,

    /// Graph-level overrides of the runtime config
    pub num_threads: Option<usize>,
    pub max_queue_size: Option<usize>,

    /// Compilation statistics
    pub stats: PlanStats,

    stream_index: HashMap<String, StreamId>,
}

/// A node with its connections resolved to stream ids.
#[derive(Debug, Clone)]
pub struct CompiledNode {
    pub id: NodeId,
    pub name: String,
    pub calculator: String,
    pub contract: Contract,
    /// Stream feeding each contract input; `None` for an unconnected optional port
    pub inputs: Vec<Option<StreamId>>,
    /// Stream fed by each contract output; `None` for an unconnected optional port
    pub outputs: Vec<Option<StreamId>>,
    /// Index into `CompiledGraph::side_packets` for each contract side input
    pub side_inputs: Vec<Option<usize>>,
    pub options: Arc<NodeOptions>,
    pub registration: Registration,
}

impl CompiledNode {
    pub fn is_source(&self) -> bool {
        self.contract.is_source()
    }
}

/// Who writes into a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProducer {
    /// Position in `CompiledGraph::graph_inputs`
    GraphInput(usize),
    /// Output port of a node
    Node { node: NodeId, port: usize },
}

#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub name: String,
    pub producer: StreamProducer,
    pub packet_type: PacketType,
    /// Every node input port reading this stream
    pub consumers: Vec<InputPortId>,
    /// Position in `CompiledGraph::graph_outputs`, if exposed
    pub graph_output: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct SidePacketInfo {
    pub name: String,
    /// `(node, side input position, expected type)` for every reader
    pub consumers: Vec<(NodeId, usize, PacketType)>,
}

/// Statistics about the compiled graph
#[derive(Debug, Clone, Default)]
pub struct PlanStats {
    /// Number of nodes after subgraph expansion
    pub total_nodes: usize,

    /// Number of nodes with no input ports
    pub source_nodes: usize,

    /// Number of streams, graph inputs included
    pub streams: usize,

    /// Number of subgraph nodes expanded
    pub expanded_subgraphs: usize,

    /// Node outputs nobody reads
    pub unconsumed_outputs: usize,

    /// Compilation time in microseconds
    pub compile_time_us: u64,
}

impl CompiledGraph {
    pub(crate) fn new(
        nodes: Vec<CompiledNode>,
        streams: Vec<StreamInfo>,
        topological_order: Vec<NodeId>,
        graph_inputs: Vec<StreamId>,
        graph_outputs: Vec<StreamId>,
        side_packets: Vec<SidePacketInfo>,
        stats: PlanStats,
    ) -> Self {
        let stream_index = streams
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), StreamId(i as u32)))
            .collect();
        Self {
            nodes,
            streams,
            topological_order,
            graph_inputs,
            graph_outputs,
            side_packets,
            num_threads: None,
            max_queue_size: None,
            stats,
            stream_index,
        }
    }

    pub fn stream_id(&self, name: &str) -> Option<StreamId> {
        self.stream_index.get(name).copied()
    }

    pub fn stream(&self, id: StreamId) -> &StreamInfo {
        &self.streams[id.index()]
    }

    pub fn node(&self, id: NodeId) -> &CompiledNode {
        &self.nodes[id.index()]
    }

    /// Position of `name` among the graph inputs.
    pub fn graph_input_position(&self, name: &str) -> Option<usize> {
        let id = self.stream_id(name)?;
        match self.stream(id).producer {
            StreamProducer::GraphInput(position) => Some(position),
            StreamProducer::Node { .. } => None,
        }
    }

    /// Position of `name` among the graph outputs.
    pub fn graph_output_position(&self, name: &str) -> Option<usize> {
        self.stream_id(name)
            .and_then(|id| self.stream(id).graph_output)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
