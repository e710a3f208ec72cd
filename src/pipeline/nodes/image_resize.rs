//! ImageResizeCalculator: scales `IMAGE` frames to a fixed size.
//!
//! Two modes:
//! - `stretch`: resample directly to the target size.
//! - `letterbox`: keep the aspect ratio and center the result on black.
//!   The placement is also emitted on the optional `LETTERBOX_PADDING` output.
//!
//! Each axis uses area averaging when it shrinks and linear interpolation
//! otherwise. The output keeps the input's format and timestamp and always
//! lives in a new buffer.

use crate::image::{letterbox, resize, ImageFrame, LetterboxGeometry};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::graph_config::NodeConfig;
use crate::pipeline::node::{Calculator, CalculatorContext, ProcessStatus};
use crate::pipeline::packet::{Packet, PacketType};
use crate::pipeline::port::Contract;
use crate::pipeline::timestamp::TimestampDiff;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMode {
    #[default]
    #[serde(alias = "STRETCH", alias = "normal", alias = "NORMAL")]
    Stretch,
    #[serde(alias = "LETTERBOX")]
    Letterbox,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImageResizeOptions {
    pub output_width: usize,
    pub output_height: usize,
    pub scale_mode: ScaleMode,
}

#[derive(Default)]
pub struct ImageResizeCalculator {
    options: ImageResizeOptions,
    frames: u64,
}

impl ImageResizeCalculator {
    pub const NAME: &'static str = "ImageResizeCalculator";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn contract(_node: &NodeConfig) -> PipelineResult<Contract> {
        Ok(Contract::new()
            .input("IMAGE", 0, PacketType::of::<ImageFrame>())
            .output("IMAGE", 0, PacketType::of::<ImageFrame>())
            .optional_output("LETTERBOX_PADDING", 0, PacketType::of::<LetterboxGeometry>())
            .with_options_type("ImageResizeCalculatorOptions"))
    }

    pub fn options(&self) -> &ImageResizeOptions {
        &self.options
    }

    /// Frames resized so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Calculator for ImageResizeCalculator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn open(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<()> {
        self.options = ctx.options().decode()?;
        if self.options.output_width == 0 || self.options.output_height == 0 {
            return Err(PipelineError::Config(format!(
                "{}: output_width and output_height must be positive, got {}x{}",
                Self::NAME,
                self.options.output_width,
                self.options.output_height
            )));
        }
        ctx.set_offset(TimestampDiff(0));
        Ok(())
    }

    fn process(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<ProcessStatus> {
        let input = ctx.input("IMAGE", 0)?;
        if input.is_empty() {
            return Ok(ProcessStatus::Continue);
        }
        let frame = input.get::<ImageFrame>()?;
        let (width, height) = (self.options.output_width, self.options.output_height);
        let ts = ctx.input_timestamp();

        match self.options.scale_mode {
            ScaleMode::Stretch => {
                let output = resize(frame, width, height)?;
                ctx.output("IMAGE", 0, Packet::new(output).at(ts))?;
            }
            ScaleMode::Letterbox => {
                let (output, geometry) = letterbox(frame, width, height)?;
                ctx.output("IMAGE", 0, Packet::new(output).at(ts))?;
                ctx.output("LETTERBOX_PADDING", 0, Packet::new(geometry).at(ts))?;
            }
        }
        self.frames += 1;
        Ok(ProcessStatus::Continue)
    }

    fn close(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<()> {
        tracing::debug!("{} resized {} frames", ctx.node_name(), self.frames);
        Ok(())
    }
}
