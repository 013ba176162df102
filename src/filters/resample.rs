//! Nearest-neighbour resampling.
//!
//! Output pixel (x, y) copies source pixel
//! `(floor(x / scale), floor(y / scale))`, clamped into the input. No
//! blending: downscaled benchmark outputs keep the aliasing of this policy
//! so timings stay comparable across backends.

use crate::core::error::{TransformError, TransformResult};
use crate::core::types::PixelBuffer;
use crate::filters::{sweep_sequential, OutputShape, RowSweep, SweepSummary};

/// Resize by `scale` with nearest-neighbour sampling.
pub fn resize(input: &PixelBuffer, scale: f64) -> TransformResult<PixelBuffer> {
    sweep_sequential(&ResizeSweep::new(scale), input).map(|(output, _)| output)
}

/// Output dimensions for a scale factor, or `DegenerateSize` if either is 0.
pub fn scaled_dimensions(width: u32, height: u32, scale: f64) -> TransformResult<(u32, u32)> {
    let degenerate = TransformError::DegenerateSize { width, height, scale };
    if !scale.is_finite() || scale <= 0.0 {
        return Err(degenerate);
    }
    let new_width = (width as f64 * scale).floor();
    let new_height = (height as f64 * scale).floor();
    if new_width < 1.0 || new_height < 1.0 || new_width > u32::MAX as f64 || new_height > u32::MAX as f64 {
        return Err(degenerate);
    }
    Ok((new_width as u32, new_height as u32))
}

/// Source index for every output index along one axis.
///
/// The backends share this table so the device kernel samples exactly the
/// same source pixels as the CPU sweep.
pub fn source_indices(output_len: u32, input_len: u32, scale: f64) -> Vec<u32> {
    (0..output_len)
        .map(|i| ((i as f64 / scale).floor() as u32).min(input_len - 1))
        .collect()
}

/// Row-band evaluator for resampling.
#[derive(Debug, Clone, Copy)]
pub struct ResizeSweep {
    scale: f64,
}

impl ResizeSweep {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl RowSweep for ResizeSweep {
    fn name(&self) -> &'static str {
        "resize"
    }

    fn output_shape(&self, input: &PixelBuffer) -> TransformResult<OutputShape> {
        let (width, height) = scaled_dimensions(input.width(), input.height(), self.scale)?;
        Ok(OutputShape {
            width,
            height,
            channels: input.channels(),
        })
    }

    fn sweep_rows(&self, input: &PixelBuffer, first_row: usize, band: &mut [u8]) -> SweepSummary {
        let src = input.as_slice();
        let cn = input.channel_count();
        let src_stride = input.row_stride();
        // Shape was validated before the band was allocated.
        let out_width = (input.width() as f64 * self.scale).floor() as u32;
        let out_stride = out_width as usize * cn;
        let xs = source_indices(out_width, input.width(), self.scale);

        for (offset, out_row) in band.chunks_exact_mut(out_stride).enumerate() {
            let y = (first_row + offset) as f64;
            let sy = ((y / self.scale).floor() as usize).min(input.height() as usize - 1);
            let src_row = &src[sy * src_stride..(sy + 1) * src_stride];
            for (out_pixel, &sx) in out_row.chunks_exact_mut(cn).zip(&xs) {
                let sx = sx as usize * cn;
                out_pixel.copy_from_slice(&src_row[sx..sx + cn]);
            }
        }

        SweepSummary::of_samples(band)
    }
}
