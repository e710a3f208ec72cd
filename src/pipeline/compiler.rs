use super::compiled_plan::{
    CompiledGraph, CompiledNode, PlanStats, SidePacketInfo, StreamInfo, StreamProducer,
};
use super::error::{PipelineError, PipelineResult};
use super::graph_config::{resolve_refs, GraphConfig, NodeConfig, StreamRef};
use super::id::{InputPortId, NodeId, StreamId};
use super::packet::PacketType;
use super::port::{port_label, Contract, TagMap};
use super::registry::{CalculatorRegistry, Registration};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Subgraphs nested deeper than this are rejected; it also stops a
/// subgraph that contains itself.
pub const MAX_SUBGRAPH_DEPTH: usize = 16;

/// Compiles a graph config into a validated execution plan
pub struct GraphCompiler;

impl GraphCompiler {
    /// Compile a graph config into a [`CompiledGraph`].
    ///
    /// Expands subgraphs, resolves every stream reference against the
    /// calculator contracts, type-checks connections and orders the nodes.
    ///
    /// # Errors
    /// Any config error: unknown calculators, streams or side packets,
    /// port mismatches, duplicate producers, type mismatches, cycles.
    pub fn compile(
        config: &GraphConfig,
        registry: &CalculatorRegistry,
    ) -> PipelineResult<CompiledGraph> {
        let start_time = std::time::Instant::now();

        // Flatten subgraphs into plain calculator nodes
        let mut flat = Vec::new();
        let mut expanded_subgraphs = 0;
        Self::expand(config, registry, "", 0, &mut flat, &mut expanded_subgraphs)?;

        let mut names = HashSet::new();
        for node in &flat {
            let name = node.name.as_deref().unwrap_or(&node.calculator);
            if !names.insert(name.to_string()) {
                return Err(PipelineError::Config(format!(
                    "node name '{name}' is used more than once"
                )));
            }
        }

        let mut side_packets = Self::declare_side_packets(config)?;
        let side_index: HashMap<String, usize> = side_packets
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();

        let mut streams: Vec<StreamInfo> = Vec::new();
        let mut stream_index: HashMap<String, StreamId> = HashMap::new();

        // Graph inputs
        let mut graph_inputs = Vec::new();
        for (position, (_, _, name)) in resolve_refs(&config.input_stream)?.into_iter().enumerate()
        {
            let id = Self::add_stream(
                &mut streams,
                &mut stream_index,
                name,
                StreamProducer::GraphInput(position),
                PacketType::any(),
            )?;
            graph_inputs.push(id);
        }

        // Contracts and outputs first, so consumers may precede producers
        let mut nodes = Vec::with_capacity(flat.len());
        for (i, node) in flat.iter().enumerate() {
            let id = NodeId(i as u32);
            let name = node.display_name(i);
            let registration = registry.get(&node.calculator)?.clone();
            let contract = registration.contract(node).map_err(|e| match e {
                PipelineError::PortMismatch(msg) => {
                    PipelineError::PortMismatch(format!("node '{name}': {msg}"))
                }
                other => other,
            })?;
            Self::check_options_type(&name, node, &contract)?;

            let mut outputs = vec![None; contract.outputs.len()];
            for (tag, index, stream) in resolve_refs(&node.output_stream)? {
                let port = Self::port_position(&name, &contract.outputs, &tag, index, "output")?;
                if outputs[port].is_some() {
                    return Err(Self::port_twice(&name, &tag, index, "output"));
                }
                let packet_type = contract
                    .outputs
                    .get(port)
                    .map_or(PacketType::any(), |p| p.packet_type);
                outputs[port] = Some(Self::add_stream(
                    &mut streams,
                    &mut stream_index,
                    stream,
                    StreamProducer::Node { node: id, port },
                    packet_type,
                )?);
            }
            Self::check_required(&name, &contract.outputs, &outputs, "output")?;

            nodes.push(CompiledNode {
                id,
                name,
                calculator: node.calculator.clone(),
                inputs: vec![None; contract.inputs.len()],
                outputs,
                side_inputs: vec![None; contract.side_inputs.len()],
                contract,
                options: Arc::new(node.options.clone()),
                registration,
            });
        }

        // Inputs and side inputs
        for (i, node) in flat.iter().enumerate() {
            let compiled = &mut nodes[i];
            for (tag, index, stream) in resolve_refs(&node.input_stream)? {
                let port = Self::port_position(
                    &compiled.name,
                    &compiled.contract.inputs,
                    &tag,
                    index,
                    "input",
                )?;
                if compiled.inputs[port].is_some() {
                    return Err(Self::port_twice(&compiled.name, &tag, index, "input"));
                }
                let stream_id = *stream_index
                    .get(&stream)
                    .ok_or_else(|| PipelineError::UnknownStream(stream.clone()))?;
                let info = &mut streams[stream_id.index()];
                if let Some(port_desc) = compiled.contract.inputs.get(port) {
                    if !info.packet_type.is_compatible_with(&port_desc.packet_type) {
                        return Err(PipelineError::StreamTypeMismatch {
                            stream: stream.clone(),
                            producer: info.packet_type.name().to_string(),
                            consumer: port_desc.packet_type.name().to_string(),
                        });
                    }
                }
                info.consumers.push(InputPortId::new(compiled.id, port));
                compiled.inputs[port] = Some(stream_id);
            }
            Self::check_required(
                &compiled.name,
                &compiled.contract.inputs,
                &compiled.inputs,
                "input",
            )?;

            for (tag, index, side) in resolve_refs(&node.input_side_packet)? {
                let port = Self::port_position(
                    &compiled.name,
                    &compiled.contract.side_inputs,
                    &tag,
                    index,
                    "side input",
                )?;
                if compiled.side_inputs[port].is_some() {
                    return Err(Self::port_twice(&compiled.name, &tag, index, "side input"));
                }
                let slot = *side_index
                    .get(&side)
                    .ok_or_else(|| PipelineError::UnknownSidePacket(side.clone()))?;
                let packet_type = compiled
                    .contract
                    .side_inputs
                    .get(port)
                    .map_or(PacketType::any(), |p| p.packet_type);
                side_packets[slot]
                    .consumers
                    .push((compiled.id, port, packet_type));
                compiled.side_inputs[port] = Some(slot);
            }
            Self::check_required(
                &compiled.name,
                &compiled.contract.side_inputs,
                &compiled.side_inputs,
                "side input",
            )?;
        }

        // Graph outputs
        let mut graph_outputs = Vec::new();
        for (position, (_, _, name)) in resolve_refs(&config.output_stream)?.into_iter().enumerate()
        {
            let id = *stream_index
                .get(&name)
                .ok_or_else(|| PipelineError::UnknownStream(name.clone()))?;
            let info = &mut streams[id.index()];
            if info.graph_output.is_some() {
                return Err(PipelineError::Config(format!(
                    "output stream '{name}' is declared more than once"
                )));
            }
            info.graph_output = Some(position);
            graph_outputs.push(id);
        }

        let topological_order = Self::topological_sort(&nodes, &streams)?;

        let mut unconsumed_outputs = 0;
        for stream in &streams {
            if let StreamProducer::Node { node, .. } = stream.producer {
                if stream.consumers.is_empty() && stream.graph_output.is_none() {
                    unconsumed_outputs += 1;
                    tracing::warn!(
                        "Stream '{}' produced by '{}' is never consumed",
                        stream.name,
                        nodes[node.index()].name
                    );
                }
            }
        }

        let stats = PlanStats {
            total_nodes: nodes.len(),
            source_nodes: nodes.iter().filter(|n| n.is_source()).count(),
            streams: streams.len(),
            expanded_subgraphs,
            unconsumed_outputs,
            compile_time_us: start_time.elapsed().as_micros() as u64,
        };

        tracing::info!(
            "Compiled graph: {} nodes ({} sources), {} streams, {} subgraphs expanded in {}us",
            stats.total_nodes,
            stats.source_nodes,
            stats.streams,
            stats.expanded_subgraphs,
            stats.compile_time_us
        );

        let mut compiled = CompiledGraph::new(
            nodes,
            streams,
            topological_order,
            graph_inputs,
            graph_outputs,
            side_packets,
            stats,
        );
        compiled.num_threads = config.num_threads;
        compiled.max_queue_size = config.max_queue_size;
        Ok(compiled)
    }

    /// Replace every subgraph node by the subgraph's nodes, recursively.
    /// Every emitted node gets an explicit, scope-prefixed name.
    fn expand(
        config: &GraphConfig,
        registry: &CalculatorRegistry,
        prefix: &str,
        depth: usize,
        out: &mut Vec<NodeConfig>,
        expanded: &mut usize,
    ) -> PipelineResult<()> {
        for (position, node) in config.node.iter().enumerate() {
            let name = format!("{prefix}{}", node.display_name(position));
            match registry.get(&node.calculator)? {
                Registration::Subgraph(sub) => {
                    if depth >= MAX_SUBGRAPH_DEPTH {
                        return Err(PipelineError::Config(format!(
                            "subgraph nesting deeper than {MAX_SUBGRAPH_DEPTH} at '{name}'"
                        )));
                    }
                    let inner = Self::bind_subgraph(&name, node, sub)?;
                    Self::expand(&inner, registry, &format!("{name}/"), depth + 1, out, expanded)?;
                    *expanded += 1;
                }
                _ => {
                    let mut node = node.clone();
                    node.name = Some(name);
                    out.push(node);
                }
            }
        }
        Ok(())
    }

    /// Rewrites a subgraph's nodes so its boundary streams and side packets
    /// take the names the outer node connects them to. Internal names get
    /// the `<node>/` prefix.
    fn bind_subgraph(
        node_name: &str,
        node: &NodeConfig,
        sub: &GraphConfig,
    ) -> PipelineResult<GraphConfig> {
        let streams = Self::boundary_map(
            node_name,
            &node.input_stream,
            &sub.input_stream,
            "input stream",
        )?
        .into_iter()
        .chain(Self::boundary_map(
            node_name,
            &node.output_stream,
            &sub.output_stream,
            "output stream",
        )?)
        .collect::<HashMap<_, _>>();
        let sides = Self::boundary_map(
            node_name,
            &node.input_side_packet,
            &sub.input_side_packet,
            "side packet",
        )?;

        let prefix = format!("{node_name}/");
        let rename =
            |refs: &[String], map: &HashMap<String, String>| -> PipelineResult<Vec<String>> {
                refs.iter()
                    .map(|text| {
                        let r = StreamRef::parse(text)?;
                        let name = map
                            .get(&r.name)
                            .cloned()
                            .unwrap_or_else(|| format!("{prefix}{}", r.name));
                        Ok(r.renamed(name).to_string())
                    })
                    .collect()
            };

        let mut inner = GraphConfig::new();
        for sub_node in &sub.node {
            let mut n = sub_node.clone();
            n.input_stream = rename(&sub_node.input_stream, &streams)?;
            n.output_stream = rename(&sub_node.output_stream, &streams)?;
            n.input_side_packet = rename(&sub_node.input_side_packet, &sides)?;
            inner.node.push(n);
        }
        Ok(inner)
    }

    /// Maps each subgraph boundary name to the outer name bound to the same
    /// `(tag, index)` on the node.
    fn boundary_map(
        node_name: &str,
        outer: &[String],
        declared: &[String],
        kind: &str,
    ) -> PipelineResult<HashMap<String, String>> {
        let declared = resolve_refs(declared)?;
        let mut map = HashMap::new();
        for (tag, index, outer_name) in resolve_refs(outer)? {
            let inner = declared
                .iter()
                .find(|(t, i, _)| *t == tag && *i == index)
                .ok_or_else(|| {
                    PipelineError::PortMismatch(format!(
                        "subgraph node '{node_name}' has no {kind} {}",
                        port_label(&tag, index)
                    ))
                })?;
            map.insert(inner.2.clone(), outer_name);
        }
        Ok(map)
    }

    fn declare_side_packets(config: &GraphConfig) -> PipelineResult<Vec<SidePacketInfo>> {
        let mut seen = HashSet::new();
        let mut side_packets = Vec::new();
        for (_, _, name) in resolve_refs(&config.input_side_packet)? {
            if !seen.insert(name.clone()) {
                return Err(PipelineError::Config(format!(
                    "side packet '{name}' is declared more than once"
                )));
            }
            side_packets.push(SidePacketInfo {
                name,
                consumers: Vec::new(),
            });
        }
        Ok(side_packets)
    }

    fn add_stream(
        streams: &mut Vec<StreamInfo>,
        index: &mut HashMap<String, StreamId>,
        name: String,
        producer: StreamProducer,
        packet_type: PacketType,
    ) -> PipelineResult<StreamId> {
        if index.contains_key(&name) {
            return Err(PipelineError::DuplicateStream(name));
        }
        let id = StreamId(streams.len() as u32);
        index.insert(name.clone(), id);
        streams.push(StreamInfo {
            name,
            producer,
            packet_type,
            consumers: Vec::new(),
            graph_output: None,
        });
        Ok(id)
    }

    fn port_position(
        node: &str,
        ports: &TagMap,
        tag: &str,
        index: usize,
        kind: &str,
    ) -> PipelineResult<usize> {
        ports.position(tag, index).ok_or_else(|| {
            PipelineError::PortMismatch(format!(
                "node '{node}' has no {kind} port {}",
                port_label(tag, index)
            ))
        })
    }

    fn port_twice(node: &str, tag: &str, index: usize, kind: &str) -> PipelineError {
        PipelineError::PortMismatch(format!(
            "node '{node}' connects {kind} port {} more than once",
            port_label(tag, index)
        ))
    }

    fn check_required<T>(
        node: &str,
        ports: &TagMap,
        connected: &[Option<T>],
        kind: &str,
    ) -> PipelineResult<()> {
        let missing: Vec<String> = ports
            .iter()
            .zip(connected)
            .filter(|(port, slot)| !port.optional && slot.is_none())
            .map(|(port, _)| port.label())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::PortMismatch(format!(
                "node '{node}' leaves required {kind} port(s) {} unconnected",
                missing.join(", ")
            )))
        }
    }

    /// A `[Type.ext]` options block must name the options type the
    /// calculator declares.
    fn check_options_type(
        name: &str,
        node: &NodeConfig,
        contract: &Contract,
    ) -> PipelineResult<()> {
        let Some(extension) = node.options.extension_type() else {
            return Ok(());
        };
        match contract.options_type {
            Some(expected) if expected == extension => Ok(()),
            Some(expected) => Err(PipelineError::Config(format!(
                "node '{name}' has options of type {extension}, {} expects {expected}",
                node.calculator
            ))),
            None => Err(PipelineError::Config(format!(
                "node '{name}' has options of type {extension}, {} takes no typed options",
                node.calculator
            ))),
        }
    }

    /// Topological sort of nodes using Kahn's algorithm.
    fn topological_sort(
        nodes: &[CompiledNode],
        streams: &[StreamInfo],
    ) -> PipelineResult<Vec<NodeId>> {
        let n = nodes.len();
        let mut adj = vec![Vec::new(); n];
        let mut in_degree = vec![0usize; n];

        for stream in streams {
            if let StreamProducer::Node { node: from, .. } = stream.producer {
                for consumer in &stream.consumers {
                    adj[from.index()].push(consumer.node.index());
                    in_degree[consumer.node.index()] += 1;
                }
            }
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut result = Vec::with_capacity(n);

        while let Some(node) = queue.pop_front() {
            result.push(NodeId(node as u32));
            for &neighbor in &adj[node] {
                in_degree[neighbor] -= 1;
                if in_degree[neighbor] == 0 {
                    queue.push_back(neighbor);
                }
            }
        }

        if result.len() < n {
            let cyclic: Vec<&str> = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| nodes[i].name.as_str())
                .collect();
            return Err(PipelineError::CycleDetected(cyclic.join(", ")));
        }
        Ok(result)
    }
}
