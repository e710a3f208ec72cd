//! PassThroughCalculator: forwards every input packet unchanged.
//!
//! Variadic: the contract mirrors the node's configured inputs, so input
//! `TAG:i` is forwarded to output `TAG:i`. Payloads are shared, never copied.
//! Declares a zero timestamp offset, which lets downstream joins settle as
//! soon as the inputs do.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::graph_config::{resolve_refs, NodeConfig};
use crate::pipeline::node::{Calculator, CalculatorContext, ProcessStatus};
use crate::pipeline::packet::PacketType;
use crate::pipeline::port::Contract;
use crate::pipeline::timestamp::TimestampDiff;

pub struct PassThroughCalculator {
    forwarded: u64,
}

impl PassThroughCalculator {
    pub const NAME: &'static str = "PassThroughCalculator";

    pub fn new() -> Self {
        Self { forwarded: 0 }
    }

    pub fn contract(node: &NodeConfig) -> PipelineResult<Contract> {
        let inputs = resolve_refs(&node.input_stream)?;
        let outputs = resolve_refs(&node.output_stream)?;
        if inputs.is_empty() {
            return Err(PipelineError::PortMismatch(format!(
                "{} needs at least one input",
                Self::NAME
            )));
        }
        if inputs.len() != outputs.len() {
            return Err(PipelineError::PortMismatch(format!(
                "{} needs as many outputs as inputs ({} vs {})",
                Self::NAME,
                inputs.len(),
                outputs.len()
            )));
        }
        let mut contract = Contract::new().with_offset(TimestampDiff(0));
        for (tag, index, _) in &inputs {
            contract = contract
                .input(tag, *index, PacketType::any())
                .output(tag, *index, PacketType::any());
        }
        Ok(contract)
    }

    /// Number of packets forwarded so far.
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }
}

impl Default for PassThroughCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl Calculator for PassThroughCalculator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<ProcessStatus> {
        for position in 0..ctx.input_count() {
            let packet = ctx.input_at(position)?.clone();
            if !packet.is_empty() {
                ctx.output_at(position, packet)?;
                self.forwarded += 1;
            }
        }
        Ok(ProcessStatus::Continue)
    }
}
