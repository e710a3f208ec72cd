//! Separable image resampling and letterbox geometry.
//!
//! Resizing runs one pass per axis. Each axis picks its own filter:
//! area averaging when it shrinks, linear interpolation when it grows or
//! keeps its size (which reduces to a plain copy). Intermediate values are
//! kept as `f32` and rounded once at the end.

use crate::image::frame::ImageFrame;
use crate::pipeline::error::{PipelineError, PipelineResult};

/// Resampling filter for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Coverage-weighted mean of the source samples under each destination sample.
    Area,
    /// Two-tap linear interpolation with half-pixel centers.
    Linear,
}

impl Interpolation {
    /// Filter for an axis going from `src` to `dst` samples.
    pub fn for_axis(src: usize, dst: usize) -> Self {
        if dst < src {
            Interpolation::Area
        } else {
            Interpolation::Linear
        }
    }
}

/// Placement of a letterboxed image inside the target frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxGeometry {
    pub scale: f64,
    pub inner_width: usize,
    pub inner_height: usize,
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
}

impl LetterboxGeometry {
    /// Fits `width`×`height` into `target_width`×`target_height` keeping the
    /// aspect ratio and centering it.
    pub fn compute(
        width: usize,
        height: usize,
        target_width: usize,
        target_height: usize,
    ) -> PipelineResult<Self> {
        if width == 0 || height == 0 || target_width == 0 || target_height == 0 {
            return Err(PipelineError::InvalidImage(format!(
                "cannot letterbox {width}x{height} into {target_width}x{target_height}"
            )));
        }
        let scale = f64::min(
            target_width as f64 / width as f64,
            target_height as f64 / height as f64,
        );
        let inner_width = ((width as f64 * scale).round() as usize).clamp(1, target_width);
        let inner_height = ((height as f64 * scale).round() as usize).clamp(1, target_height);
        let top = (target_height - inner_height) / 2;
        let left = (target_width - inner_width) / 2;
        Ok(Self {
            scale,
            inner_width,
            inner_height,
            top,
            bottom: target_height - inner_height - top,
            left,
            right: target_width - inner_width - left,
        })
    }
}

/// Source taps and weights for every destination sample along one axis.
type AxisTaps = Vec<Vec<(usize, f32)>>;

fn axis_taps(src: usize, dst: usize, filter: Interpolation) -> AxisTaps {
    let scale = src as f64 / dst as f64;
    (0..dst)
        .map(|d| match filter {
            Interpolation::Area => {
                let start = d as f64 * scale;
                let end = ((d + 1) as f64 * scale).min(src as f64);
                let first = start.floor() as usize;
                let last = (end.ceil() as usize).min(src);
                (first..last)
                    .filter_map(|s| {
                        let overlap = end.min((s + 1) as f64) - start.max(s as f64);
                        (overlap > 1e-9).then(|| (s, (overlap / (end - start)) as f32))
                    })
                    .collect()
            }
            Interpolation::Linear => {
                let pos = ((d as f64 + 0.5) * scale - 0.5).max(0.0);
                let s0 = (pos.floor() as usize).min(src - 1);
                let s1 = (s0 + 1).min(src - 1);
                let frac = (pos - s0 as f64).clamp(0.0, 1.0) as f32;
                if s0 == s1 || frac == 0.0 {
                    vec![(s0, 1.0)]
                } else {
                    vec![(s0, 1.0 - frac), (s1, frac)]
                }
            }
        })
        .collect()
}

/// Resizes `src` to `width`×`height`, choosing the filter per axis.
/// Always allocates a new buffer; the pixel format is preserved.
pub fn resize(src: &ImageFrame, width: usize, height: usize) -> PipelineResult<ImageFrame> {
    if src.is_empty() || width == 0 || height == 0 {
        return Err(PipelineError::InvalidImage(format!(
            "cannot resize {}x{} to {width}x{height}",
            src.width(),
            src.height()
        )));
    }
    let channels = src.channels();
    let (src_w, src_h) = (src.width(), src.height());
    let x_taps = axis_taps(src_w, width, Interpolation::for_axis(src_w, width));
    let y_taps = axis_taps(src_h, height, Interpolation::for_axis(src_h, height));

    // Horizontal pass: src_h rows of `width` samples.
    let mut horizontal = vec![0f32; width * src_h * channels];
    for y in 0..src_h {
        let row = src.row(y);
        let out = &mut horizontal[y * width * channels..(y + 1) * width * channels];
        for (x, taps) in x_taps.iter().enumerate() {
            for c in 0..channels {
                out[x * channels + c] = taps
                    .iter()
                    .map(|&(s, w)| row[s * channels + c] as f32 * w)
                    .sum();
            }
        }
    }

    // Vertical pass.
    let row_len = width * channels;
    let mut pixels = Vec::with_capacity(height * row_len);
    for taps in &y_taps {
        for i in 0..row_len {
            let v: f32 = taps
                .iter()
                .map(|&(s, w)| horizontal[s * row_len + i] * w)
                .sum();
            pixels.push(v.round().clamp(0.0, 255.0) as u8);
        }
    }

    ImageFrame::from_pixels(src.format(), width, height, pixels)
}

/// Resizes `src` into `target_width`×`target_height` preserving its aspect
/// ratio, centered on a black background.
pub fn letterbox(
    src: &ImageFrame,
    target_width: usize,
    target_height: usize,
) -> PipelineResult<(ImageFrame, LetterboxGeometry)> {
    let geometry =
        LetterboxGeometry::compute(src.width(), src.height(), target_width, target_height)?;
    let inner = resize(src, geometry.inner_width, geometry.inner_height)?;
    let mut out = ImageFrame::new(src.format(), target_width, target_height);
    out.paste(&inner, geometry.left, geometry.top)?;
    Ok((out, geometry))
}
