//! Built-in calculator kinds.
//!
//! Each kind maps a registered name to a contract function and a
//! constructor for the matching [`BuiltinCalculator`] variant.

use crate::pipeline::error::PipelineResult;
use crate::pipeline::graph_config::NodeConfig;
use crate::pipeline::node::BuiltinCalculator;
use crate::pipeline::nodes::{
    AddConstantCalculator, AffineCalculator, ImageResizeCalculator, PassThroughCalculator,
    StringJoinCalculator, StringSourceCalculator,
};
use crate::pipeline::port::Contract;
use serde::{Deserialize, Serialize};

/// Types of built-in calculators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalculatorKind {
    PassThrough,
    StringSource,
    StringJoin,
    Affine,
    AddConstant,
    ImageResize,
}

impl CalculatorKind {
    /// Name under which the kind is registered.
    pub fn registered_name(&self) -> &'static str {
        match self {
            CalculatorKind::PassThrough => PassThroughCalculator::NAME,
            CalculatorKind::StringSource => StringSourceCalculator::NAME,
            CalculatorKind::StringJoin => StringJoinCalculator::NAME,
            CalculatorKind::Affine => AffineCalculator::NAME,
            CalculatorKind::AddConstant => AddConstantCalculator::NAME,
            CalculatorKind::ImageResize => ImageResizeCalculator::NAME,
        }
    }

    /// Get all built-in kinds.
    pub fn all() -> &'static [CalculatorKind] {
        &[
            CalculatorKind::PassThrough,
            CalculatorKind::StringSource,
            CalculatorKind::StringJoin,
            CalculatorKind::Affine,
            CalculatorKind::AddConstant,
            CalculatorKind::ImageResize,
        ]
    }

    pub fn from_name(name: &str) -> Option<CalculatorKind> {
        Self::all()
            .iter()
            .copied()
            .find(|k| k.registered_name() == name)
    }

    /// Check if this kind has no inputs.
    pub fn is_source(&self) -> bool {
        matches!(self, CalculatorKind::StringSource)
    }

    pub fn contract(&self, node: &NodeConfig) -> PipelineResult<Contract> {
        match self {
            CalculatorKind::PassThrough => PassThroughCalculator::contract(node),
            CalculatorKind::StringSource => StringSourceCalculator::contract(node),
            CalculatorKind::StringJoin => StringJoinCalculator::contract(node),
            CalculatorKind::Affine => AffineCalculator::contract(node),
            CalculatorKind::AddConstant => AddConstantCalculator::contract(node),
            CalculatorKind::ImageResize => ImageResizeCalculator::contract(node),
        }
    }

    pub fn create(&self) -> BuiltinCalculator {
        match self {
            CalculatorKind::PassThrough => {
                BuiltinCalculator::PassThrough(PassThroughCalculator::new())
            }
            CalculatorKind::StringSource => {
                BuiltinCalculator::StringSource(StringSourceCalculator::new())
            }
            CalculatorKind::StringJoin => {
                BuiltinCalculator::StringJoin(StringJoinCalculator::new())
            }
            CalculatorKind::Affine => BuiltinCalculator::Affine(AffineCalculator::new()),
            CalculatorKind::AddConstant => {
                BuiltinCalculator::AddConstant(AddConstantCalculator::new())
            }
            CalculatorKind::ImageResize => {
                BuiltinCalculator::ImageResize(ImageResizeCalculator::new())
            }
        }
    }
}

impl std::fmt::Display for CalculatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.registered_name())
    }
}
