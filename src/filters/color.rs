//! Luminance conversion and binary thresholding.

use crate::core::error::TransformResult;
use crate::core::types::{Channels, PixelBuffer};
use crate::filters::{sweep_sequential, OutputShape, RowSweep, SweepSummary};

/// BT.709 luma weights for red, green and blue.
pub const LUMA_WEIGHTS: [f32; 3] = [0.2125, 0.7154, 0.0721];

/// Convert to a single luminance channel. Gray input is copied.
pub fn grayscale(input: &PixelBuffer) -> TransformResult<PixelBuffer> {
    sweep_sequential(&GrayscaleSweep, input).map(|(output, _)| output)
}

/// Map every sample `>= level` to 255 and the rest to 0.
pub fn threshold(input: &PixelBuffer, level: u8) -> TransformResult<PixelBuffer> {
    sweep_sequential(&ThresholdSweep::new(level), input).map(|(output, _)| output)
}

/// Row-band evaluator for [`grayscale`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GrayscaleSweep;

impl RowSweep for GrayscaleSweep {
    fn name(&self) -> &'static str {
        "grayscale"
    }

    fn output_shape(&self, input: &PixelBuffer) -> TransformResult<OutputShape> {
        Ok(OutputShape {
            width: input.width(),
            height: input.height(),
            channels: Channels::Gray,
        })
    }

    fn sweep_rows(&self, input: &PixelBuffer, first_row: usize, band: &mut [u8]) -> SweepSummary {
        let rows = band.len() / input.width() as usize;
        let stride = input.row_stride();
        let src = &input.as_slice()[first_row * stride..(first_row + rows) * stride];

        match input.channels() {
            Channels::Gray => band.copy_from_slice(src),
            Channels::Rgb => {
                let [wr, wg, wb] = LUMA_WEIGHTS;
                for (out, rgb) in band.iter_mut().zip(src.chunks_exact(3)) {
                    let luma = rgb[0] as f32 * wr + rgb[1] as f32 * wg + rgb[2] as f32 * wb;
                    *out = luma.min(255.0) as u8;
                }
            }
        }

        SweepSummary::of_samples(band)
    }
}

/// Row-band evaluator for [`threshold`].
#[derive(Debug, Clone, Copy)]
pub struct ThresholdSweep {
    level: u8,
}

impl ThresholdSweep {
    pub fn new(level: u8) -> Self {
        Self { level }
    }

    pub fn level(&self) -> u8 {
        self.level
    }
}

impl RowSweep for ThresholdSweep {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn output_shape(&self, input: &PixelBuffer) -> TransformResult<OutputShape> {
        Ok(OutputShape {
            width: input.width(),
            height: input.height(),
            channels: input.channels(),
        })
    }

    fn sweep_rows(&self, input: &PixelBuffer, first_row: usize, band: &mut [u8]) -> SweepSummary {
        let start = first_row * input.row_stride();
        let src = &input.as_slice()[start..start + band.len()];
        for (out, &v) in band.iter_mut().zip(src) {
            *out = if v >= self.level { 255 } else { 0 };
        }
        SweepSummary::of_samples(band)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grayscale_weights() {
        let input = PixelBuffer::from_samples(3, 1, Channels::Rgb, vec![255, 0, 0, 0, 255, 0, 10, 20, 30]).unwrap();
        let output = grayscale(&input).unwrap();
        assert_eq!(output.channels(), Channels::Gray);
        // 54.19, 182.43, 2.125 + 14.308 + 2.163
        assert_eq!(output.as_slice(), &[54, 182, 18]);
    }

    #[test]
    fn test_grayscale_copies_gray_input() {
        let input = PixelBuffer::from_fn(4, 3, Channels::Gray, |x, y, _| (x * 20 + y) as u8).unwrap();
        assert_eq!(grayscale(&input).unwrap(), input);
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let input = PixelBuffer::from_samples(4, 1, Channels::Gray, vec![0, 149, 150, 251]).unwrap();
        let output = threshold(&input, 150).unwrap();
        assert_eq!(output.as_slice(), &[0, 0, 255, 255]);
    }

    #[test]
    fn test_threshold_keeps_channel_count() {
        let input = PixelBuffer::filled(2, 2, Channels::Rgb, 200).unwrap();
        let output = threshold(&input, 100).unwrap();
        assert_eq!(output.channels(), Channels::Rgb);
        assert!(output.as_slice().iter().all(|&v| v == 255));
    }
}
