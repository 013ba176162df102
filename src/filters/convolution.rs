//! 2-D convolution with an odd square kernel.
//!
//! Only pixels whose whole neighbourhood lies inside the image are swept.
//! The `radius`-wide frame around the edge is filled according to
//! [`BorderPolicy`]: zeros by default, or the input samples copied through.
//!
//! Results are accumulated in `f32` and clamped to [0, 255] before
//! truncation, so sharpening overshoot saturates instead of wrapping.

use crate::core::error::TransformResult;
use crate::core::types::{Kernel, PixelBuffer};
use crate::filters::{sweep_sequential, OutputShape, RowSweep, SweepSummary};
use serde::{Deserialize, Serialize};

/// What to write into the unswept frame of a convolution output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderPolicy {
    /// Leave border samples at 0.
    #[default]
    Zero,
    /// Copy border samples from the input.
    CopyInput,
}

/// Convolve with the default [`BorderPolicy::Zero`].
pub fn convolve(input: &PixelBuffer, kernel: &Kernel) -> TransformResult<PixelBuffer> {
    convolve_with_border(input, kernel, BorderPolicy::Zero)
}

/// Convolve with an explicit border policy.
pub fn convolve_with_border(
    input: &PixelBuffer,
    kernel: &Kernel,
    border: BorderPolicy,
) -> TransformResult<PixelBuffer> {
    let sweep = ConvolutionSweep::new(kernel.clone(), border);
    sweep_sequential(&sweep, input).map(|(output, _)| output)
}

/// Row-band evaluator for convolution.
#[derive(Debug, Clone)]
pub struct ConvolutionSweep {
    kernel: Kernel,
    border: BorderPolicy,
}

impl ConvolutionSweep {
    pub fn new(kernel: Kernel, border: BorderPolicy) -> Self {
        Self { kernel, border }
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn border(&self) -> BorderPolicy {
        self.border
    }
}

impl RowSweep for ConvolutionSweep {
    fn name(&self) -> &'static str {
        "convolve"
    }

    fn output_shape(&self, input: &PixelBuffer) -> TransformResult<OutputShape> {
        Ok(OutputShape {
            width: input.width(),
            height: input.height(),
            channels: input.channels(),
        })
    }

    fn sweep_rows(&self, input: &PixelBuffer, first_row: usize, band: &mut [u8]) -> SweepSummary {
        let src = input.as_slice();
        let w = input.width() as usize;
        let h = input.height() as usize;
        let cn = input.channel_count();
        let stride = input.row_stride();
        let size = self.kernel.size();
        let r = self.kernel.radius();
        let weights = self.kernel.weights();
        let copy_border = self.border == BorderPolicy::CopyInput;
        let mut clamped = 0u64;

        for (offset, out_row) in band.chunks_exact_mut(stride).enumerate() {
            let y = first_row + offset;
            let src_row = &src[y * stride..(y + 1) * stride];

            if y < r || y + r >= h || w <= 2 * r {
                if copy_border {
                    out_row.copy_from_slice(src_row);
                }
                continue;
            }

            if copy_border {
                out_row[..r * cn].copy_from_slice(&src_row[..r * cn]);
                out_row[(w - r) * cn..].copy_from_slice(&src_row[(w - r) * cn..]);
            }

            // Top-left corner of the neighbourhood of pixel (r, y).
            let window_top = (y - r) * stride;
            for x in r..w - r {
                let window_left = window_top + (x - r) * cn;
                for c in 0..cn {
                    let mut acc = 0.0f32;
                    for i in 0..size {
                        let column = window_left + i * cn + c;
                        let column_weights = &weights[i * size..(i + 1) * size];
                        for (j, &weight) in column_weights.iter().enumerate() {
                            acc += src[column + j * stride] as f32 * weight;
                        }
                    }
                    if !(0.0..=255.0).contains(&acc) {
                        clamped += 1;
                    }
                    out_row[x * cn + c] = acc.min(255.0).max(0.0) as u8;
                }
            }
        }

        SweepSummary {
            clamped,
            ..SweepSummary::of_samples(band)
        }
    }
}
