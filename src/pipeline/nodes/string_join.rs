//! StringJoinCalculator: concatenates `STR:0` and `STR:1` per timestamp.
//!
//! An input without a packet at the current timestamp contributes the
//! placeholder (`"<EMPTY>"` by default) instead of failing.

use crate::pipeline::error::PipelineResult;
use crate::pipeline::graph_config::NodeConfig;
use crate::pipeline::node::{Calculator, CalculatorContext, ProcessStatus};
use crate::pipeline::packet::{Packet, PacketType};
use crate::pipeline::port::Contract;
use crate::pipeline::timestamp::TimestampDiff;
use serde::Deserialize;

pub const EMPTY_PLACEHOLDER: &str = "<EMPTY>";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StringJoinOptions {
    pub separator: String,
    pub placeholder: String,
}

impl Default for StringJoinOptions {
    fn default() -> Self {
        Self {
            separator: String::new(),
            placeholder: EMPTY_PLACEHOLDER.to_string(),
        }
    }
}

#[derive(Default)]
pub struct StringJoinCalculator {
    options: StringJoinOptions,
}

impl StringJoinCalculator {
    pub const NAME: &'static str = "StringJoinCalculator";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn contract(_node: &NodeConfig) -> PipelineResult<Contract> {
        Ok(Contract::new()
            .input("STR", 0, PacketType::of::<String>())
            .input("STR", 1, PacketType::of::<String>())
            .output("STR", 0, PacketType::of::<String>())
            .with_offset(TimestampDiff(0))
            .with_options_type("StringJoinCalculatorOptions"))
    }

    fn part<'p>(&'p self, packet: &'p Packet) -> PipelineResult<&'p str> {
        if packet.is_empty() {
            Ok(&self.options.placeholder)
        } else {
            Ok(packet.get::<String>()?.as_str())
        }
    }
}

impl Calculator for StringJoinCalculator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn open(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<()> {
        self.options = ctx.options().decode()?;
        Ok(())
    }

    fn process(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<ProcessStatus> {
        let joined = format!(
            "{}{}{}",
            self.part(ctx.input("STR", 0)?)?,
            self.options.separator,
            self.part(ctx.input("STR", 1)?)?
        );
        let ts = ctx.input_timestamp();
        ctx.output("STR", 0, Packet::new(joined).at(ts))?;
        Ok(ProcessStatus::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::PipelineError;
    use crate::pipeline::graph_config::NodeOptions;
    use crate::pipeline::timestamp::Timestamp;

    fn run(inputs: Vec<Packet>, options: NodeOptions) -> PipelineResult<String> {
        let node = NodeConfig::new(StringJoinCalculator::NAME);
        let contract = StringJoinCalculator::contract(&node)?;
        let mut calc = StringJoinCalculator::new();
        let mut ctx = CalculatorContext::new("join", &contract, &options, &[]);
        calc.open(&mut ctx)?;
        let mut ctx = CalculatorContext::new("join", &contract, &options, &[])
            .with_inputs(Timestamp::new(1), &inputs);
        calc.process(&mut ctx)?;
        let (outputs, _) = ctx.into_parts();
        Ok(outputs[0].1.get::<String>()?.clone())
    }

    #[test]
    fn test_joins_both_inputs() {
        let inputs = vec![
            Packet::new("a".to_string()).at(1),
            Packet::new("b".to_string()).at(1),
        ];
        assert_eq!(run(inputs, NodeOptions::default()).unwrap(), "ab");
    }

    #[test]
    fn test_missing_input_uses_placeholder() {
        let inputs = vec![Packet::empty(), Packet::new("gen: 1".to_string()).at(1)];
        assert_eq!(
            run(inputs, NodeOptions::default()).unwrap(),
            "<EMPTY>gen: 1"
        );
    }

    #[test]
    fn test_separator_option() {
        let mut options = NodeOptions::default();
        options.values.insert("separator".into(), " | ".into());
        let inputs = vec![Packet::new("x".to_string()).at(1), Packet::empty()];
        assert_eq!(run(inputs, options).unwrap(), "x | <EMPTY>");
    }

    #[test]
    fn test_wrong_payload_type_is_an_error() {
        let inputs = vec![Packet::new(5i32).at(1), Packet::empty()];
        assert!(matches!(
            run(inputs, NodeOptions::default()),
            Err(PipelineError::PacketTypeMismatch { .. })
        ));
    }
}
