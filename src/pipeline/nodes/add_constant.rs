//! AddConstantCalculator: adds the `constant` option to `INPUT` (i64).

use crate::pipeline::error::PipelineResult;
use crate::pipeline::graph_config::NodeConfig;
use crate::pipeline::node::{Calculator, CalculatorContext, ProcessStatus};
use crate::pipeline::packet::{Packet, PacketType};
use crate::pipeline::port::Contract;
use crate::pipeline::timestamp::TimestampDiff;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AddConstantOptions {
    pub constant: i64,
}

#[derive(Default)]
pub struct AddConstantCalculator {
    constant: i64,
}

impl AddConstantCalculator {
    pub const NAME: &'static str = "AddConstantCalculator";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn contract(_node: &NodeConfig) -> PipelineResult<Contract> {
        Ok(Contract::new()
            .input("INPUT", 0, PacketType::of::<i64>())
            .output("OUTPUT", 0, PacketType::of::<i64>())
            .with_offset(TimestampDiff(0))
            .with_options_type("AddConstantCalculatorOptions"))
    }
}

impl Calculator for AddConstantCalculator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn open(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<()> {
        let options: AddConstantOptions = ctx.options().decode()?;
        self.constant = options.constant;
        Ok(())
    }

    fn process(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<ProcessStatus> {
        let input = ctx.input("INPUT", 0)?;
        if input.is_empty() {
            return Ok(ProcessStatus::Continue);
        }
        let value = input.get::<i64>()?.wrapping_add(self.constant);
        let ts = ctx.input_timestamp();
        ctx.output("OUTPUT", 0, Packet::new(value).at(ts))?;
        Ok(ProcessStatus::Continue)
    }
}
