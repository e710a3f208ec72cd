//! StringSourceCalculator: bounded source of numbered strings.
//!
//! Emits `"{prefix}{t}"` at timestamps `start..start + count`, one packet per
//! poll, then returns `Stop`.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::graph_config::NodeConfig;
use crate::pipeline::node::{Calculator, CalculatorContext, ProcessStatus};
use crate::pipeline::packet::{Packet, PacketType};
use crate::pipeline::port::Contract;
use crate::pipeline::timestamp::Timestamp;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StringSourceOptions {
    pub count: i64,
    pub start: i64,
    pub prefix: String,
}

impl Default for StringSourceOptions {
    fn default() -> Self {
        Self {
            count: 10,
            start: 0,
            prefix: String::new(),
        }
    }
}

pub struct StringSourceCalculator {
    options: StringSourceOptions,
    next: i64,
    /// One past the last timestamp
    end: i64,
}

impl StringSourceCalculator {
    pub const NAME: &'static str = "StringSourceCalculator";

    pub fn new() -> Self {
        let options = StringSourceOptions::default();
        Self {
            next: options.start,
            end: options.start + options.count,
            options,
        }
    }

    pub fn contract(_node: &NodeConfig) -> PipelineResult<Contract> {
        Ok(Contract::new()
            .output("STR", 0, PacketType::of::<String>())
            .with_options_type("StringSourceCalculatorOptions"))
    }

    /// Timestamp of the next packet to emit.
    pub fn next_timestamp(&self) -> i64 {
        self.next
    }
}

impl Default for StringSourceCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl Calculator for StringSourceCalculator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn open(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<()> {
        self.options = ctx.options().decode()?;
        if self.options.count < 0 {
            return Err(PipelineError::Config(format!(
                "{}: count must be non-negative, got {}",
                Self::NAME,
                self.options.count
            )));
        }
        self.end = self
            .options
            .start
            .checked_add(self.options.count)
            .filter(|_| self.options.start >= Timestamp::MIN.value())
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "{}: start {} with count {} leaves the timestamp range",
                    Self::NAME,
                    self.options.start,
                    self.options.count
                ))
            })?;
        self.next = self.options.start;
        Ok(())
    }

    fn process(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<ProcessStatus> {
        if self.next >= self.end {
            tracing::debug!("{} emitted {} packets", ctx.node_name(), self.options.count);
            return Ok(ProcessStatus::Stop);
        }
        let text = format!("{}{}", self.options.prefix, self.next);
        ctx.output("STR", 0, Packet::new(text).at(Timestamp::new(self.next)))?;
        self.next += 1;
        Ok(ProcessStatus::Continue)
    }
}
