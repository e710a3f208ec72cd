//! AffineCalculator: `y = a * x + b` on `f64` packets.
//!
//! Coefficients are resolved once in `open`: side packets `#0` (a) and `#1`
//! (b) win over the `a`/`b` options, which win over the defaults `a = 2`,
//! `b = 0`.

use crate::pipeline::error::PipelineResult;
use crate::pipeline::graph_config::NodeConfig;
use crate::pipeline::node::{Calculator, CalculatorContext, ProcessStatus};
use crate::pipeline::packet::{Packet, PacketType};
use crate::pipeline::port::Contract;
use crate::pipeline::timestamp::TimestampDiff;

pub const DEFAULT_A: f64 = 2.0;
pub const DEFAULT_B: f64 = 0.0;

pub struct AffineCalculator {
    a: f64,
    b: f64,
}

impl AffineCalculator {
    pub const NAME: &'static str = "AffineCalculator";

    pub fn new() -> Self {
        Self {
            a: DEFAULT_A,
            b: DEFAULT_B,
        }
    }

    pub fn contract(_node: &NodeConfig) -> PipelineResult<Contract> {
        Ok(Contract::new()
            .input("", 0, PacketType::of::<f64>())
            .output("", 0, PacketType::of::<f64>())
            .optional_side_input("", 0, PacketType::of::<f64>())
            .optional_side_input("", 1, PacketType::of::<f64>())
            .with_offset(TimestampDiff(0))
            .with_options_type("AffineCalculatorOptions"))
    }

    pub fn coefficients(&self) -> (f64, f64) {
        (self.a, self.b)
    }

    fn resolve(
        ctx: &CalculatorContext,
        side_index: usize,
        option: &str,
        default: f64,
    ) -> PipelineResult<f64> {
        if ctx.has_side_packet("", side_index) {
            return Ok(*ctx.side_packet_index(side_index)?.get::<f64>()?);
        }
        Ok(ctx.options().get_f64(option).unwrap_or(default))
    }
}

impl Default for AffineCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl Calculator for AffineCalculator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn open(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<()> {
        self.a = Self::resolve(ctx, 0, "a", DEFAULT_A)?;
        self.b = Self::resolve(ctx, 1, "b", DEFAULT_B)?;
        tracing::debug!("{}: y = {} * x + {}", ctx.node_name(), self.a, self.b);
        Ok(())
    }

    fn process(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<ProcessStatus> {
        let input = ctx.input_index(0)?;
        if input.is_empty() {
            return Ok(ProcessStatus::Continue);
        }
        let y = self.a * *input.get::<f64>()? + self.b;
        let ts = ctx.input_timestamp();
        ctx.output_index(0, Packet::new(y).at(ts))?;
        Ok(ProcessStatus::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::graph_config::NodeOptions;
    use crate::pipeline::timestamp::Timestamp;

    fn open_with(options: &NodeOptions, side: &[Packet]) -> AffineCalculator {
        let contract = AffineCalculator::contract(&NodeConfig::default()).unwrap();
        let mut calc = AffineCalculator::new();
        let mut ctx = CalculatorContext::new("affine", &contract, options, side);
        calc.open(&mut ctx).unwrap();
        calc
    }

    #[test]
    fn test_defaults() {
        let calc = open_with(&NodeOptions::default(), &[Packet::empty(), Packet::empty()]);
        assert_eq!(calc.coefficients(), (2.0, 0.0));
    }

    #[test]
    fn test_options() {
        let node = NodeConfig::new(AffineCalculator::NAME)
            .with_option("a", 7.0)
            .with_option("b", 3.0);
        let calc = open_with(&node.options, &[Packet::empty(), Packet::empty()]);
        assert_eq!(calc.coefficients(), (7.0, 3.0));
    }

    #[test]
    fn test_side_packets_override_options() {
        let node = NodeConfig::new(AffineCalculator::NAME).with_option("a", 7.0);
        let calc = open_with(&node.options, &[Packet::new(1.5f64), Packet::new(-1.0f64)]);
        assert_eq!(calc.coefficients(), (1.5, -1.0));
    }

    #[test]
    fn test_process() {
        let node = NodeConfig::new(AffineCalculator::NAME)
            .with_option("a", 7.0)
            .with_option("b", 3.0);
        let side = [Packet::empty(), Packet::empty()];
        let mut calc = open_with(&node.options, &side);
        let contract = AffineCalculator::contract(&node).unwrap();

        let inputs = vec![Packet::new(2.0f64).at(9)];
        let mut ctx = CalculatorContext::new("affine", &contract, &node.options, &side)
            .with_inputs(Timestamp::new(9), &inputs);
        calc.process(&mut ctx).unwrap();
        let (outputs, _) = ctx.into_parts();
        assert_eq!(*outputs[0].1.get::<f64>().unwrap(), 17.0);
        assert_eq!(outputs[0].1.timestamp(), Timestamp::new(9));
    }
}
