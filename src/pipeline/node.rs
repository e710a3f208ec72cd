//! Calculator abstraction for the pipeline.
//!
//! Two-layer design:
//! - **`Calculator` trait**: the three-call lifecycle every node implements,
//!   and the extension point for calculators registered at runtime.
//! - **`BuiltinCalculator` enum**: all built-in calculators. The compiler can
//!   inline match arms, eliminating dynamic dispatch overhead on the hot path.
//!
//! `AnyCalculator` wraps either variant so the executor can handle both uniformly.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::graph_config::NodeOptions;
use crate::pipeline::packet::Packet;
use crate::pipeline::port::{port_label, Contract};
use crate::pipeline::timestamp::{Timestamp, TimestampDiff};

/// Result of a successful `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Keep scheduling this node.
    Continue,
    /// The node will never emit again; its outputs are closed.
    Stop,
}

/// Lifecycle of a node within one graph run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeLifecycle {
    Constructed,
    Opened,
    Running,
    Closed,
}

/// Context passed to calculator lifecycle hooks.
///
/// Inputs are positioned as in the calculator's [`Contract`]; each slot holds
/// either the packet at [`input_timestamp`](Self::input_timestamp) or an
/// empty marker.
pub struct CalculatorContext<'a> {
    node_name: &'a str,
    contract: &'a Contract,
    options: &'a NodeOptions,
    side_packets: &'a [Packet],
    input_timestamp: Timestamp,
    inputs: &'a [Packet],
    outputs: Vec<(usize, Packet)>,
    offset: Option<TimestampDiff>,
}

impl<'a> CalculatorContext<'a> {
    pub fn new(
        node_name: &'a str,
        contract: &'a Contract,
        options: &'a NodeOptions,
        side_packets: &'a [Packet],
    ) -> Self {
        Self {
            node_name,
            contract,
            options,
            side_packets,
            input_timestamp: Timestamp::UNSET,
            inputs: &[],
            outputs: Vec::new(),
            offset: contract.timestamp_offset,
        }
    }

    /// Sets the input set for a `process` call.
    pub fn with_inputs(mut self, timestamp: Timestamp, inputs: &'a [Packet]) -> Self {
        self.input_timestamp = timestamp;
        self.inputs = inputs;
        self
    }

    /// Carries over the offset established by an earlier `open`.
    pub fn with_offset(mut self, offset: Option<TimestampDiff>) -> Self {
        self.offset = offset;
        self
    }

    pub fn node_name(&self) -> &str {
        self.node_name
    }

    /// Timestamp of the current invocation. `UNSET` for sources and for
    /// `open`/`close`.
    pub fn input_timestamp(&self) -> Timestamp {
        self.input_timestamp
    }

    pub fn options(&self) -> &NodeOptions {
        self.options
    }

    pub fn input_count(&self) -> usize {
        self.contract.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.contract.outputs.len()
    }

    /// The input packet on port `tag:index`, empty if absent at this timestamp.
    pub fn input(&self, tag: &str, index: usize) -> PipelineResult<&Packet> {
        let position = self
            .contract
            .inputs
            .position(tag, index)
            .ok_or_else(|| self.unknown_port("input", tag, index))?;
        self.input_at(position)
    }

    /// Untagged input by index.
    pub fn input_index(&self, index: usize) -> PipelineResult<&Packet> {
        self.input("", index)
    }

    /// Input by contract position.
    pub fn input_at(&self, position: usize) -> PipelineResult<&Packet> {
        self.inputs.get(position).ok_or_else(|| {
            PipelineError::PortMismatch(format!(
                "node '{}' has no input at position {position}",
                self.node_name
            ))
        })
    }

    pub fn has_side_packet(&self, tag: &str, index: usize) -> bool {
        self.contract
            .side_inputs
            .position(tag, index)
            .and_then(|p| self.side_packets.get(p))
            .is_some_and(|p| !p.is_empty())
    }

    /// The side packet on port `tag:index`, empty if an optional side input
    /// was left unconnected.
    pub fn side_packet(&self, tag: &str, index: usize) -> PipelineResult<&Packet> {
        let position = self
            .contract
            .side_inputs
            .position(tag, index)
            .ok_or_else(|| self.unknown_port("side input", tag, index))?;
        self.side_packets.get(position).ok_or_else(|| {
            PipelineError::PortMismatch(format!(
                "node '{}' has no side packet at position {position}",
                self.node_name
            ))
        })
    }

    pub fn side_packet_index(&self, index: usize) -> PipelineResult<&Packet> {
        self.side_packet("", index)
    }

    /// Emits `packet` on output `tag:index`. The packet must carry a range
    /// timestamp and match the port's declared type.
    pub fn output(&mut self, tag: &str, index: usize, packet: Packet) -> PipelineResult<()> {
        let position = self
            .contract
            .outputs
            .position(tag, index)
            .ok_or_else(|| self.unknown_port("output", tag, index))?;
        self.output_at(position, packet)
    }

    pub fn output_index(&mut self, index: usize, packet: Packet) -> PipelineResult<()> {
        self.output("", index, packet)
    }

    pub fn output_at(&mut self, position: usize, packet: Packet) -> PipelineResult<()> {
        let port = self.contract.outputs.get(position).ok_or_else(|| {
            PipelineError::PortMismatch(format!(
                "node '{}' has no output at position {position}",
                self.node_name
            ))
        })?;
        if !packet.timestamp().is_range_value() {
            return Err(PipelineError::InvalidTimestamp {
                stream: format!("{}:{}", self.node_name, port.label()),
                timestamp: packet.timestamp(),
            });
        }
        if !packet.matches(&port.packet_type) {
            return Err(PipelineError::PacketTypeMismatch {
                expected: port.packet_type.name(),
                actual: packet.type_name(),
            });
        }
        self.outputs.push((position, packet));
        Ok(())
    }

    /// Declares that outputs are never stamped earlier than
    /// `input_timestamp + offset`. Meant to be called from `open`.
    pub fn set_offset(&mut self, offset: TimestampDiff) {
        self.offset = Some(offset);
    }

    pub fn offset(&self) -> Option<TimestampDiff> {
        self.offset
    }

    /// Packets emitted so far, as `(output position, packet)`.
    pub fn outputs(&self) -> &[(usize, Packet)] {
        &self.outputs
    }

    /// Consumes the context, returning the emitted packets and the offset.
    pub fn into_parts(self) -> (Vec<(usize, Packet)>, Option<TimestampDiff>) {
        (self.outputs, self.offset)
    }

    fn unknown_port(&self, kind: &str, tag: &str, index: usize) -> PipelineError {
        PipelineError::PortMismatch(format!(
            "node '{}' has no {kind} port {}",
            self.node_name,
            port_label(tag, index)
        ))
    }
}

/// Lifecycle of a calculator. `open` and `close` run exactly once per run.
pub trait Calculator: Send {
    /// Registered type name of this calculator.
    fn name(&self) -> &str;

    /// Called once before the first `process`, with side packets and options
    /// resolved.
    fn open(&mut self, _ctx: &mut CalculatorContext) -> PipelineResult<()> {
        Ok(())
    }

    /// Called once per ready timestamp, or repeatedly for sources.
    fn process(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<ProcessStatus>;

    /// Called once after all inputs are closed and drained.
    fn close(&mut self, _ctx: &mut CalculatorContext) -> PipelineResult<()> {
        Ok(())
    }
}

// Forward-declare built-in calculator types (defined in nodes/ submodule).
use crate::pipeline::nodes::{
    AddConstantCalculator, AffineCalculator, ImageResizeCalculator, PassThroughCalculator,
    StringJoinCalculator, StringSourceCalculator,
};

/// Enum dispatch for built-in calculators, with no dynamic dispatch overhead.
pub enum BuiltinCalculator {
    PassThrough(PassThroughCalculator),
    StringSource(StringSourceCalculator),
    StringJoin(StringJoinCalculator),
    Affine(AffineCalculator),
    AddConstant(AddConstantCalculator),
    ImageResize(ImageResizeCalculator),
}

impl BuiltinCalculator {
    pub fn name(&self) -> &str {
        match self {
            BuiltinCalculator::PassThrough(n) => n.name(),
            BuiltinCalculator::StringSource(n) => n.name(),
            BuiltinCalculator::StringJoin(n) => n.name(),
            BuiltinCalculator::Affine(n) => n.name(),
            BuiltinCalculator::AddConstant(n) => n.name(),
            BuiltinCalculator::ImageResize(n) => n.name(),
        }
    }

    pub fn open(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<()> {
        match self {
            BuiltinCalculator::PassThrough(n) => n.open(ctx),
            BuiltinCalculator::StringSource(n) => n.open(ctx),
            BuiltinCalculator::StringJoin(n) => n.open(ctx),
            BuiltinCalculator::Affine(n) => n.open(ctx),
            BuiltinCalculator::AddConstant(n) => n.open(ctx),
            BuiltinCalculator::ImageResize(n) => n.open(ctx),
        }
    }

    pub fn process(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<ProcessStatus> {
        match self {
            BuiltinCalculator::PassThrough(n) => n.process(ctx),
            BuiltinCalculator::StringSource(n) => n.process(ctx),
            BuiltinCalculator::StringJoin(n) => n.process(ctx),
            BuiltinCalculator::Affine(n) => n.process(ctx),
            BuiltinCalculator::AddConstant(n) => n.process(ctx),
            BuiltinCalculator::ImageResize(n) => n.process(ctx),
        }
    }

    pub fn close(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<()> {
        match self {
            BuiltinCalculator::PassThrough(n) => n.close(ctx),
            BuiltinCalculator::StringSource(n) => n.close(ctx),
            BuiltinCalculator::StringJoin(n) => n.close(ctx),
            BuiltinCalculator::Affine(n) => n.close(ctx),
            BuiltinCalculator::AddConstant(n) => n.close(ctx),
            BuiltinCalculator::ImageResize(n) => n.close(ctx),
        }
    }
}

/// Wrapper that holds either a built-in calculator (enum dispatch) or a plugin (trait object).
pub enum AnyCalculator {
    Builtin(BuiltinCalculator),
    Plugin(Box<dyn Calculator>),
}

impl AnyCalculator {
    pub fn name(&self) -> &str {
        match self {
            AnyCalculator::Builtin(n) => n.name(),
            AnyCalculator::Plugin(n) => n.name(),
        }
    }

    pub fn open(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<()> {
        match self {
            AnyCalculator::Builtin(n) => n.open(ctx),
            AnyCalculator::Plugin(n) => n.open(ctx),
        }
    }

    pub fn process(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<ProcessStatus> {
        match self {
            AnyCalculator::Builtin(n) => n.process(ctx),
            AnyCalculator::Plugin(n) => n.process(ctx),
        }
    }

    pub fn close(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<()> {
        match self {
            AnyCalculator::Builtin(n) => n.close(ctx),
            AnyCalculator::Plugin(n) => n.close(ctx),
        }
    }
}
