//! Built-in calculator implementations.

pub mod add_constant;
pub mod affine;
pub mod image_resize;
pub mod pass_through;
pub mod string_join;
pub mod string_source;

pub use add_constant::AddConstantCalculator;
pub use affine::AffineCalculator;
pub use image_resize::{ImageResizeCalculator, ImageResizeOptions, ScaleMode};
pub use pass_through::PassThroughCalculator;
pub use string_join::{StringJoinCalculator, EMPTY_PLACEHOLDER};
pub use string_source::StringSourceCalculator;
