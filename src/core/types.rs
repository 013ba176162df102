//! Core data types that flow through the transform stages.
//!
//! A [`PixelBuffer`] is a contiguous row-major `u8` sample array. Engines
//! read it through slices and stride arithmetic rather than per-pixel
//! accessors, and every transform allocates a fresh buffer for its output.

use crate::core::error::{TransformError, TransformResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sample layout of a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channels {
    /// Single luminance sample per pixel.
    Gray,
    /// Red, green, blue samples per pixel.
    Rgb,
}

impl Channels {
    /// Number of samples per pixel.
    pub fn count(self) -> usize {
        match self {
            Channels::Gray => 1,
            Channels::Rgb => 3,
        }
    }

    /// Map a sample count back to a layout.
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(Channels::Gray),
            3 => Some(Channels::Rgb),
            _ => None,
        }
    }
}

impl fmt::Display for Channels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channels::Gray => write!(f, "gray"),
            Channels::Rgb => write!(f, "rgb"),
        }
    }
}

/// An owned width × height grid of 8-bit samples.
///
/// Invariants: `width > 0`, `height > 0`, and
/// `samples.len() == width * height * channels`. Constructors enforce all
/// three, so engines never see an empty image.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: Channels,
    samples: Vec<u8>,
}

impl PixelBuffer {
    /// Allocate a zero-filled buffer.
    pub fn new(width: u32, height: u32, channels: Channels) -> TransformResult<Self> {
        Self::filled(width, height, channels, 0)
    }

    /// Allocate a buffer with every sample set to `value`.
    pub fn filled(width: u32, height: u32, channels: Channels, value: u8) -> TransformResult<Self> {
        check_dimensions(width, height, channels)?;
        let len = width as usize * height as usize * channels.count();
        Ok(Self {
            width,
            height,
            channels,
            samples: vec![value; len],
        })
    }

    /// Wrap an existing row-major sample vector.
    pub fn from_samples(
        width: u32,
        height: u32,
        channels: Channels,
        samples: Vec<u8>,
    ) -> TransformResult<Self> {
        check_dimensions(width, height, channels)?;
        let expected = width as usize * height as usize * channels.count();
        if samples.len() != expected {
            return Err(TransformError::InvalidImage {
                width,
                height,
                channels: channels.count() as u8,
                reason: format!("expected {} samples, got {}", expected, samples.len()),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            samples,
        })
    }

    /// Build a buffer by evaluating `f(x, y, channel)` for every sample.
    ///
    /// Convenience for tests and synthetic benchmark inputs.
    pub fn from_fn(
        width: u32,
        height: u32,
        channels: Channels,
        f: impl Fn(u32, u32, usize) -> u8,
    ) -> TransformResult<Self> {
        let mut buffer = Self::new(width, height, channels)?;
        let cn = channels.count();
        let stride = buffer.row_stride();
        for (y, row) in buffer.samples.chunks_exact_mut(stride).enumerate() {
            for (x, pixel) in row.chunks_exact_mut(cn).enumerate() {
                for (c, sample) in pixel.iter_mut().enumerate() {
                    *sample = f(x as u32, y as u32, c);
                }
            }
        }
        Ok(buffer)
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Sample layout.
    pub fn channels(&self) -> Channels {
        self.channels
    }

    /// Samples per pixel.
    pub fn channel_count(&self) -> usize {
        self.channels.count()
    }

    /// Number of samples in one row.
    pub fn row_stride(&self) -> usize {
        self.width as usize * self.channels.count()
    }

    /// Total size of the sample array in bytes.
    pub fn byte_len(&self) -> usize {
        self.samples.len()
    }

    /// Borrow the row-major samples.
    pub fn as_slice(&self) -> &[u8] {
        &self.samples
    }

    /// Mutably borrow the row-major samples.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.samples
    }

    /// Consume the buffer and return its samples.
    pub fn into_samples(self) -> Vec<u8> {
        self.samples
    }

    /// Read one sample. Bounds-checked; not meant for hot loops.
    pub fn sample(&self, x: u32, y: u32, channel: usize) -> Option<u8> {
        if x >= self.width || y >= self.height || channel >= self.channels.count() {
            return None;
        }
        let idx = y as usize * self.row_stride() + x as usize * self.channels.count() + channel;
        self.samples.get(idx).copied()
    }

    /// Whether two buffers share dimensions and layout.
    pub fn same_shape(&self, other: &PixelBuffer) -> bool {
        self.width == other.width && self.height == other.height && self.channels == other.channels
    }

    /// Largest absolute per-sample difference to another buffer of the same shape.
    pub fn max_abs_diff(&self, other: &PixelBuffer) -> Option<u8> {
        if !self.same_shape(other) {
            return None;
        }
        Some(
            self.samples
                .iter()
                .zip(&other.samples)
                .map(|(a, b)| a.abs_diff(*b))
                .max()
                .unwrap_or(0),
        )
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("samples", &format_args!("[{} bytes]", self.samples.len()))
            .finish()
    }
}

fn check_dimensions(width: u32, height: u32, channels: Channels) -> TransformResult<()> {
    if width == 0 || height == 0 {
        return Err(TransformError::InvalidImage {
            width,
            height,
            channels: channels.count() as u8,
            reason: "width and height must be positive".to_string(),
        });
    }
    Ok(())
}

/// An odd-sized square convolution kernel.
///
/// `weights` is stored as `size` groups of `size` values. The outer index is
/// the horizontal offset `di + c` and the inner one the vertical offset
/// `dj + c`, with `c = size / 2`.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    size: usize,
    weights: Vec<f32>,
}

impl Kernel {
    /// Create a kernel, validating the size and weight count.
    pub fn new(size: i64, weights: Vec<f32>) -> TransformResult<Self> {
        if size <= 0 {
            return Err(TransformError::InvalidKernel {
                size,
                reason: "size must be positive".to_string(),
            });
        }
        if size % 2 == 0 {
            return Err(TransformError::InvalidKernel {
                size,
                reason: "size must be odd".to_string(),
            });
        }
        let n = size as usize;
        if weights.len() != n * n {
            return Err(TransformError::InvalidKernel {
                size,
                reason: format!("expected {} weights, got {}", n * n, weights.len()),
            });
        }
        Ok(Self { size: n, weights })
    }

    /// Create a kernel from a fixed square matrix.
    pub fn from_matrix<const N: usize>(matrix: [[f32; N]; N]) -> TransformResult<Self> {
        Self::new(N as i64, matrix.iter().flatten().copied().collect())
    }

    /// `[[0,0,0],[0,1,0],[0,0,0]]`.
    pub fn identity() -> Self {
        Self {
            size: 3,
            weights: vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
        }
    }

    /// Eight-neighbour sharpening kernel.
    pub fn sharpen() -> Self {
        Self {
            size: 3,
            weights: vec![-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0],
        }
    }

    /// Diagonal relief kernel.
    pub fn emboss() -> Self {
        Self {
            size: 3,
            weights: vec![-2.0, -1.0, 0.0, -1.0, 1.0, 1.0, 0.0, 1.0, 2.0],
        }
    }

    /// Horizontal-derivative Sobel kernel (responds to vertical edges).
    pub fn sobel_x() -> Self {
        Self {
            size: 3,
            weights: vec![-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0],
        }
    }

    /// Vertical-derivative Sobel kernel (responds to horizontal edges).
    pub fn sobel_y() -> Self {
        Self {
            size: 3,
            weights: vec![-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0],
        }
    }

    /// Normalised box blur of the given odd size.
    pub fn box_blur(size: i64) -> TransformResult<Self> {
        let n = size.max(0) as usize;
        let weight = if n == 0 { 0.0 } else { 1.0 / (n * n) as f32 };
        Self::new(size, vec![weight; n * n])
    }

    /// Side length.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Half-width `size / 2`.
    pub fn radius(&self) -> usize {
        self.size / 2
    }

    /// All weights, outer index horizontal.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Weight at horizontal index `i` and vertical index `j` (both in `0..size`).
    pub fn weight(&self, i: usize, j: usize) -> f32 {
        self.weights[i * self.size + j]
    }

    /// Copy with every weight multiplied by `factor`.
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            size: self.size,
            weights: self.weights.iter().map(|w| w * factor).collect(),
        }
    }
}

/// Square structuring element for binary morphology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuringElement {
    radius: u32,
}

impl StructuringElement {
    /// Create a (2·radius+1)² square element.
    pub fn new(radius: i64) -> TransformResult<Self> {
        if radius < 0 {
            return Err(TransformError::InvalidRadius(radius));
        }
        let radius = u32::try_from(radius).map_err(|_| TransformError::InvalidRadius(radius))?;
        Ok(Self { radius })
    }

    /// Half-width of the square.
    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// Side length `2·radius + 1`, widened so large radii cannot overflow.
    pub fn side(&self) -> u64 {
        2 * u64::from(self.radius) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(matches!(
            PixelBuffer::new(0, 4, Channels::Gray),
            Err(TransformError::InvalidImage { width: 0, .. })
        ));
        assert!(PixelBuffer::new(4, 0, Channels::Rgb).is_err());
    }

    #[test]
    fn test_from_samples_length_checked() {
        assert!(PixelBuffer::from_samples(2, 2, Channels::Rgb, vec![0; 12]).is_ok());
        assert!(PixelBuffer::from_samples(2, 2, Channels::Rgb, vec![0; 11]).is_err());
    }

    #[test]
    fn test_row_major_layout() {
        let buffer = PixelBuffer::from_fn(3, 2, Channels::Rgb, |x, y, c| (y * 30 + x * 3) as u8 + c as u8).unwrap();
        assert_eq!(buffer.row_stride(), 9);
        assert_eq!(buffer.sample(2, 1, 1), Some(30 + 6 + 1));
        assert_eq!(buffer.as_slice()[9 + 6 + 1], 37);
        assert_eq!(buffer.sample(3, 0, 0), None);
    }

    #[test]
    fn test_kernel_validation() {
        assert!(matches!(
            Kernel::new(2, vec![0.0; 4]),
            Err(TransformError::InvalidKernel { size: 2, .. })
        ));
        assert!(Kernel::new(0, vec![]).is_err());
        assert!(Kernel::new(-3, vec![]).is_err());
        assert!(Kernel::new(3, vec![0.0; 8]).is_err());
        assert_eq!(Kernel::new(1, vec![2.0]).unwrap().radius(), 0);
    }

    #[test]
    fn test_kernel_indexing() {
        let kernel = Kernel::from_matrix([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]).unwrap();
        assert_eq!(kernel.weight(0, 2), 3.0);
        assert_eq!(kernel.weight(2, 0), 7.0);
        assert_eq!(kernel.scaled(2.0).weight(1, 1), 10.0);
    }

    #[test]
    fn test_box_blur_sums_to_one() {
        let kernel = Kernel::box_blur(5).unwrap();
        let sum: f32 = kernel.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(Kernel::box_blur(4).is_err());
    }

    #[test]
    fn test_structuring_element() {
        assert_eq!(StructuringElement::new(2).unwrap().side(), 5);
        assert_eq!(
            StructuringElement::new(-1),
            Err(TransformError::InvalidRadius(-1))
        );
    }

    #[test]
    fn test_huge_structuring_element_side() {
        let element = StructuringElement::new(u32::MAX as i64).unwrap();
        assert_eq!(element.side(), 2 * u32::MAX as u64 + 1);
        assert!(StructuringElement::new(u32::MAX as i64 + 1).is_err());
    }

    #[test]
    fn test_sobel_kernels_are_transposes() {
        let (gx, gy) = (Kernel::sobel_x(), Kernel::sobel_y());
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(gx.weight(i, j), gy.weight(j, i));
            }
        }
        // Outer index is horizontal: the right column carries the positive weights.
        assert_eq!(gx.weight(2, 1), 2.0);
        assert_eq!(gy.weight(1, 2), 2.0);
    }
}
