//! CPU image buffers and resampling used by the image calculators.

pub mod frame;
pub mod resize;

pub use frame::{ImageFormat, ImageFrame};
pub use resize::{letterbox, resize, Interpolation, LetterboxGeometry};
