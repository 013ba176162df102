//! Pixel engines.
//!
//! Every engine is expressed as a [`RowSweep`]: given a read-only input it
//! fills a band of consecutive output rows. The sequential path sweeps one
//! band covering the whole image; the thread-pool backend hands disjoint
//! bands to workers. Because a band only ever reads the input, the two paths
//! produce identical bytes.

pub mod color;
pub mod composite;
pub mod convolution;
pub mod edges;
pub mod morphology;
pub mod registry;
pub mod resample;

pub use color::{grayscale, threshold, GrayscaleSweep, ThresholdSweep};
pub use composite::{composite, composite_pyramid, CompositeSweep};
pub use convolution::{convolve, convolve_with_border, BorderPolicy, ConvolutionSweep};
pub use edges::{sobel, SobelSweep};
pub use morphology::{erode, erode_with, ErosionSweep};
pub use registry::{Operation, OperationRegistry, Stage};
pub use resample::{resize, ResizeSweep};

use crate::core::error::TransformResult;
use crate::core::types::{Channels, PixelBuffer};
use serde::{Deserialize, Serialize};

/// Scalar statistics gathered alongside a sweep.
///
/// Workers each fill their own summary; summaries are merged after the
/// workers join, so no counter is shared on the hot path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    /// Output samples written.
    pub samples: u64,
    /// Sum of all output samples.
    pub sum: u64,
    /// Convolution results that fell outside [0, 255] and were clamped.
    pub clamped: u64,
}

impl SweepSummary {
    /// Summary of a finished band.
    pub fn of_samples(band: &[u8]) -> Self {
        Self {
            samples: band.len() as u64,
            sum: band.iter().map(|&v| v as u64).sum(),
            clamped: 0,
        }
    }

    /// Combine two partial summaries.
    pub fn merge(self, other: Self) -> Self {
        Self {
            samples: self.samples + other.samples,
            sum: self.sum + other.sum,
            clamped: self.clamped + other.clamped,
        }
    }

    /// Mean output sample value.
    pub fn mean(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.sum as f64 / self.samples as f64
        }
    }
}

/// Output geometry of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputShape {
    pub width: u32,
    pub height: u32,
    pub channels: Channels,
}

impl OutputShape {
    /// Samples per output row.
    pub fn row_stride(&self) -> usize {
        self.width as usize * self.channels.count()
    }

    /// Allocate a zeroed buffer of this shape.
    pub fn allocate(&self) -> TransformResult<PixelBuffer> {
        PixelBuffer::new(self.width, self.height, self.channels)
    }
}

/// A transform that can be evaluated one band of output rows at a time.
///
/// `sweep_rows` receives a zero-initialised `band` holding whole output rows
/// starting at `first_row`. It must only read `input` and write `band`.
pub trait RowSweep: Send + Sync {
    /// Stable stage name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Validate the input and compute the output geometry.
    ///
    /// Called before any output is allocated.
    fn output_shape(&self, input: &PixelBuffer) -> TransformResult<OutputShape>;

    /// Fill `band` with output rows `first_row..first_row + band.len() / stride`.
    fn sweep_rows(&self, input: &PixelBuffer, first_row: usize, band: &mut [u8]) -> SweepSummary;
}

/// Evaluate a sweep on the calling thread.
pub fn sweep_sequential(
    sweep: &dyn RowSweep,
    input: &PixelBuffer,
) -> TransformResult<(PixelBuffer, SweepSummary)> {
    let shape = sweep.output_shape(input)?;
    let mut output = shape.allocate()?;
    let summary = sweep.sweep_rows(input, 0, output.as_mut_slice());
    Ok((output, summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_merge() {
        let a = SweepSummary::of_samples(&[0, 255, 5]);
        let b = SweepSummary {
            samples: 1,
            sum: 40,
            clamped: 2,
        };
        let merged = a.merge(b);
        assert_eq!(merged.samples, 4);
        assert_eq!(merged.sum, 300);
        assert_eq!(merged.clamped, 2);
        assert!((merged.mean() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_summary_mean() {
        assert_eq!(SweepSummary::default().mean(), 0.0);
    }
}
