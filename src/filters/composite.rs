//! Multi-resolution composite.
//!
//! Blends an image with half- and quarter-scale copies of itself:
//! `out(x, y) = (full(x, y) + half(x / 2, y / 2) + quarter(x / 4, y / 4)) / 3`
//! in integer arithmetic, with coarse coordinates clamped into each level.
//! The bundled `combine_images` device kernel computes the same expression,
//! so this is the reference the GPU backend is checked against.

use crate::core::error::{TransformError, TransformResult};
use crate::core::types::PixelBuffer;
use crate::filters::resample::resize;
use crate::filters::{sweep_sequential, OutputShape, RowSweep, SweepSummary};

/// Combine three pyramid levels into one image of `full`'s size.
pub fn composite(full: &PixelBuffer, half: &PixelBuffer, quarter: &PixelBuffer) -> TransformResult<PixelBuffer> {
    sweep_sequential(&CompositeSweep::new(half, quarter), full).map(|(output, _)| output)
}

/// Derive the half and quarter levels from `input` and combine them.
pub fn composite_pyramid(input: &PixelBuffer) -> TransformResult<PixelBuffer> {
    let (half, quarter) = pyramid_levels(input)?;
    composite(input, &half, &quarter)
}

/// Half- and quarter-scale levels of `input`.
pub fn pyramid_levels(input: &PixelBuffer) -> TransformResult<(PixelBuffer, PixelBuffer)> {
    let half = resize(input, 0.5)?;
    let quarter = resize(&half, 0.5)?;
    Ok((half, quarter))
}

/// Row-band evaluator for the composite. The sweep input is the full level.
#[derive(Debug, Clone, Copy)]
pub struct CompositeSweep<'a> {
    half: &'a PixelBuffer,
    quarter: &'a PixelBuffer,
}

impl<'a> CompositeSweep<'a> {
    pub fn new(half: &'a PixelBuffer, quarter: &'a PixelBuffer) -> Self {
        Self { half, quarter }
    }
}

/// Sample a coarse level at `(x / factor, y / factor)`, clamped.
#[inline]
fn coarse_offset(level: &PixelBuffer, x: usize, y: usize, factor: usize) -> usize {
    let cx = (x / factor).min(level.width() as usize - 1);
    let cy = (y / factor).min(level.height() as usize - 1);
    cy * level.row_stride() + cx * level.channel_count()
}

impl RowSweep for CompositeSweep<'_> {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn output_shape(&self, full: &PixelBuffer) -> TransformResult<OutputShape> {
        for level in [self.half, self.quarter] {
            if level.channels() != full.channels() {
                return Err(TransformError::InvalidImage {
                    width: level.width(),
                    height: level.height(),
                    channels: level.channel_count() as u8,
                    reason: format!("composite levels must all have {} channels", full.channel_count()),
                });
            }
        }
        Ok(OutputShape {
            width: full.width(),
            height: full.height(),
            channels: full.channels(),
        })
    }

    fn sweep_rows(&self, full: &PixelBuffer, first_row: usize, band: &mut [u8]) -> SweepSummary {
        let cn = full.channel_count();
        let stride = full.row_stride();
        let src = full.as_slice();
        let half = self.half.as_slice();
        let quarter = self.quarter.as_slice();

        for (offset, out_row) in band.chunks_exact_mut(stride).enumerate() {
            let y = first_row + offset;
            let row = &src[y * stride..(y + 1) * stride];
            for (x, out_pixel) in out_row.chunks_exact_mut(cn).enumerate() {
                let h = coarse_offset(self.half, x, y, 2);
                let q = coarse_offset(self.quarter, x, y, 4);
                for c in 0..cn {
                    let sum = row[x * cn + c] as u32 + half[h + c] as u32 + quarter[q + c] as u32;
                    out_pixel[c] = (sum / 3) as u8;
                }
            }
        }

        SweepSummary::of_samples(band)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Channels;

    #[test]
    fn test_uniform_levels_average() {
        let full = PixelBuffer::filled(8, 8, Channels::Rgb, 90).unwrap();
        let half = PixelBuffer::filled(4, 4, Channels::Rgb, 30).unwrap();
        let quarter = PixelBuffer::filled(2, 2, Channels::Rgb, 1).unwrap();
        let output = composite(&full, &half, &quarter).unwrap();
        assert!(output.same_shape(&full));
        // (90 + 30 + 1) / 3 = 40
        assert!(output.as_slice().iter().all(|&v| v == 40));
    }

    #[test]
    fn test_coarse_coordinates_follow_scale() {
        let full = PixelBuffer::filled(4, 4, Channels::Gray, 0).unwrap();
        let half = PixelBuffer::from_fn(2, 2, Channels::Gray, |x, y, _| (30 * (y * 2 + x)) as u8).unwrap();
        let quarter = PixelBuffer::filled(1, 1, Channels::Gray, 0).unwrap();
        let output = composite(&full, &half, &quarter).unwrap();
        assert_eq!(output.sample(1, 1, 0), Some(0));
        assert_eq!(output.sample(2, 0, 0), Some(10));
        assert_eq!(output.sample(3, 3, 0), Some(30));
    }

    #[test]
    fn test_small_levels_are_clamped() {
        let full = PixelBuffer::filled(9, 9, Channels::Gray, 3).unwrap();
        let half = PixelBuffer::filled(1, 1, Channels::Gray, 3).unwrap();
        let quarter = PixelBuffer::filled(1, 1, Channels::Gray, 3).unwrap();
        let output = composite(&full, &half, &quarter).unwrap();
        assert!(output.as_slice().iter().all(|&v| v == 3));
    }

    #[test]
    fn test_mismatched_channels_rejected() {
        let full = PixelBuffer::filled(4, 4, Channels::Rgb, 0).unwrap();
        let half = PixelBuffer::filled(2, 2, Channels::Gray, 0).unwrap();
        let quarter = PixelBuffer::filled(1, 1, Channels::Rgb, 0).unwrap();
        assert!(matches!(
            composite(&full, &half, &quarter),
            Err(TransformError::InvalidImage { channels: 1, .. })
        ));
    }

    #[test]
    fn test_pyramid_of_flat_image_is_flat() {
        let input = PixelBuffer::filled(16, 12, Channels::Rgb, 77).unwrap();
        let output = composite_pyramid(&input).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_pyramid_needs_four_pixels_per_side() {
        let input = PixelBuffer::filled(3, 8, Channels::Gray, 1).unwrap();
        assert!(matches!(composite_pyramid(&input), Err(TransformError::DegenerateSize { .. })));
    }
}
