//! Owned, tightly packed 8-bit image buffers.

use crate::pipeline::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Interleaved 8-bit pixel layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    Gray8,
    Rgb24,
    Rgba32,
    Bgra32,
}

impl ImageFormat {
    /// Bytes per pixel.
    pub fn channels(self) -> usize {
        match self {
            ImageFormat::Gray8 => 1,
            ImageFormat::Rgb24 => 3,
            ImageFormat::Rgba32 | ImageFormat::Bgra32 => 4,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageFormat::Gray8 => "GRAY8",
            ImageFormat::Rgb24 => "SRGB",
            ImageFormat::Rgba32 => "SRGBA",
            ImageFormat::Bgra32 => "SBGRA",
        };
        write!(f, "{name}")
    }
}

/// A row-major image with no row padding.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageFrame {
    format: ImageFormat,
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl ImageFrame {
    /// A zero-filled (black) image.
    pub fn new(format: ImageFormat, width: usize, height: usize) -> Self {
        Self {
            format,
            width,
            height,
            pixels: vec![0; width * height * format.channels()],
        }
    }

    /// Wraps existing pixel data; its length must match the dimensions.
    pub fn from_pixels(
        format: ImageFormat,
        width: usize,
        height: usize,
        pixels: Vec<u8>,
    ) -> PipelineResult<Self> {
        let expected = width * height * format.channels();
        if pixels.len() != expected {
            return Err(PipelineError::InvalidImage(format!(
                "{width}x{height} {format} needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            format,
            width,
            height,
            pixels,
        })
    }

    /// Builds an image by evaluating `f(x, y, channel)` for every sample.
    pub fn from_fn(
        format: ImageFormat,
        width: usize,
        height: usize,
        mut f: impl FnMut(usize, usize, usize) -> u8,
    ) -> Self {
        let channels = format.channels();
        let mut pixels = Vec::with_capacity(width * height * channels);
        for y in 0..height {
            for x in 0..width {
                for c in 0..channels {
                    pixels.push(f(x, y, c));
                }
            }
        }
        Self {
            format,
            width,
            height,
            pixels,
        }
    }

    #[inline]
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    /// Bytes per row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.width * self.format.channels()
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    pub fn row(&self, y: usize) -> &[u8] {
        let stride = self.stride();
        &self.pixels[y * stride..(y + 1) * stride]
    }

    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        let channels = self.channels();
        let offset = y * self.stride() + x * channels;
        &self.pixels[offset..offset + channels]
    }

    /// Copies `src` into this image with its top-left corner at `(left, top)`.
    pub fn paste(&mut self, src: &ImageFrame, left: usize, top: usize) -> PipelineResult<()> {
        if src.format != self.format {
            return Err(PipelineError::InvalidImage(format!(
                "cannot paste {} into {}",
                src.format, self.format
            )));
        }
        if left + src.width > self.width || top + src.height > self.height {
            return Err(PipelineError::InvalidImage(format!(
                "{}x{} at ({left}, {top}) does not fit in {}x{}",
                src.width, src.height, self.width, self.height
            )));
        }
        let channels = self.channels();
        let dst_stride = self.stride();
        for y in 0..src.height {
            let start = (top + y) * dst_stride + left * channels;
            self.pixels[start..start + src.stride()].copy_from_slice(src.row(y));
        }
        Ok(())
    }
}

impl fmt::Debug for ImageFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageFrame")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_black() {
        let img = ImageFrame::new(ImageFormat::Rgb24, 4, 2);
        assert_eq!(img.pixels().len(), 24);
        assert!(img.pixels().iter().all(|&p| p == 0));
        assert_eq!(img.stride(), 12);
    }

    #[test]
    fn test_from_pixels_validates_length() {
        assert!(ImageFrame::from_pixels(ImageFormat::Gray8, 2, 2, vec![0; 4]).is_ok());
        assert!(matches!(
            ImageFrame::from_pixels(ImageFormat::Rgba32, 2, 2, vec![0; 4]),
            Err(PipelineError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_from_fn_and_pixel_access() {
        let img =
            ImageFrame::from_fn(ImageFormat::Rgb24, 3, 2, |x, y, c| (x * 10 + y * 100 + c) as u8);
        assert_eq!(img.pixel(2, 1), &[120, 121, 122]);
        assert_eq!(img.row(1).len(), 9);
    }

    #[test]
    fn test_paste() {
        let mut dst = ImageFrame::new(ImageFormat::Gray8, 4, 4);
        let src = ImageFrame::from_pixels(ImageFormat::Gray8, 2, 1, vec![7, 9]).unwrap();
        dst.paste(&src, 1, 2).unwrap();
        assert_eq!(dst.row(2), &[0, 7, 9, 0]);
        assert_eq!(dst.row(1), &[0, 0, 0, 0]);
        assert!(dst.paste(&src, 3, 0).is_err());

        let rgb = ImageFrame::new(ImageFormat::Rgb24, 1, 1);
        assert!(dst.paste(&rgb, 0, 0).is_err());
    }
}
