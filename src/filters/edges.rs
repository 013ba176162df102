//! Sobel edge response.
//!
//! Each interior sample is the saturating sum of the horizontal and vertical
//! Sobel responses, each clamped to [0, 255] first:
//! `out = min(clamp(gx) + clamp(gy), 255)`. Negative gradients therefore
//! contribute nothing, matching a `u8` convolution with each kernel followed
//! by a saturating add. The one-pixel frame is left at 0, like
//! [`BorderPolicy::Zero`](crate::filters::BorderPolicy::Zero).
//!
//! All arithmetic is integer, so every backend agrees exactly.

use crate::core::error::TransformResult;
use crate::core::types::PixelBuffer;
use crate::filters::{sweep_sequential, OutputShape, RowSweep, SweepSummary};

/// Combined Sobel response of every channel.
pub fn sobel(input: &PixelBuffer) -> TransformResult<PixelBuffer> {
    sweep_sequential(&SobelSweep, input).map(|(output, _)| output)
}

/// Row-band evaluator for the Sobel response.
#[derive(Debug, Clone, Copy, Default)]
pub struct SobelSweep;

impl RowSweep for SobelSweep {
    fn name(&self) -> &'static str {
        "sobel"
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
        let mut clamped = 0u64;

        for (offset, out_row) in band.chunks_exact_mut(stride).enumerate() {
            let y = first_row + offset;
            if y == 0 || y + 1 >= h || w < 3 {
                continue;
            }
            let above = &src[(y - 1) * stride..y * stride];
            let row = &src[y * stride..(y + 1) * stride];
            let below = &src[(y + 1) * stride..(y + 2) * stride];

            for x in 1..w - 1 {
                let (l, m, r) = ((x - 1) * cn, x * cn, (x + 1) * cn);
                for c in 0..cn {
                    let at = |line: &[u8], i: usize| line[i + c] as i32;
                    let gx = at(above, r) + 2 * at(row, r) + at(below, r)
                        - at(above, l)
                        - 2 * at(row, l)
                        - at(below, l);
                    let gy = at(below, l) + 2 * at(below, m) + at(below, r)
                        - at(above, l)
                        - 2 * at(above, m)
                        - at(above, r);
                    let sum = gx.clamp(0, 255) + gy.clamp(0, 255);
                    if !(0..=255).contains(&gx) || !(0..=255).contains(&gy) || sum > 255 {
                        clamped += 1;
                    }
                    out_row[m + c] = sum.min(255) as u8;
                }
            }
        }

        SweepSummary {
            clamped,
            ..SweepSummary::of_samples(band)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Channels, Kernel};
    use crate::filters::convolution::convolve;

    fn vertical_step(width: u32, height: u32, edge: u32) -> PixelBuffer {
        PixelBuffer::from_fn(width, height, Channels::Gray, |x, _, _| if x < edge { 20 } else { 80 }).unwrap()
    }

    #[test]
    fn test_vertical_step_edge() {
        let output = sobel(&vertical_step(8, 6, 4)).unwrap();
        // Rising edge: gx = 4 * 60 = 240 on both columns touching it; gy = 0.
        assert_eq!(output.sample(3, 2, 0), Some(240));
        assert_eq!(output.sample(4, 2, 0), Some(240));
        assert_eq!(output.sample(1, 2, 0), Some(0));
        assert_eq!(output.sample(6, 3, 0), Some(0));
        // Frame stays zero.
        assert_eq!(output.sample(3, 0, 0), Some(0));
        assert_eq!(output.sample(7, 2, 0), Some(0));
    }

    #[test]
    fn test_falling_edge_is_suppressed() {
        let input = PixelBuffer::from_fn(8, 6, Channels::Gray, |x, _, _| if x < 4 { 200 } else { 10 }).unwrap();
        assert!(sobel(&input).unwrap().as_slice().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_matches_saturating_sum_of_convolutions() {
        let input = PixelBuffer::from_fn(13, 9, Channels::Rgb, |x, y, c| {
            ((x * 41 + y * 23 + c as u32 * 67 + (x * y) % 7) % 256) as u8
        })
        .unwrap();
        let gx = convolve(&input, &Kernel::sobel_x()).unwrap();
        let gy = convolve(&input, &Kernel::sobel_y()).unwrap();
        let expected: Vec<u8> = gx
            .as_slice()
            .iter()
            .zip(gy.as_slice())
            .map(|(&a, &b)| a.saturating_add(b))
            .collect();
        assert_eq!(sobel(&input).unwrap().as_slice(), expected.as_slice());
    }

    #[test]
    fn test_saturation_is_counted() {
        let input = PixelBuffer::from_fn(5, 5, Channels::Gray, |x, y, _| if x >= 2 && y >= 2 { 255 } else { 0 }).unwrap();
        let (output, summary) = sweep_sequential(&SobelSweep, &input).unwrap();
        assert_eq!(output.sample(2, 2, 0), Some(255));
        assert!(summary.clamped > 0);
    }

    #[test]
    fn test_narrow_image_is_all_frame() {
        let input = PixelBuffer::filled(2, 5, Channels::Gray, 90).unwrap();
        assert!(sobel(&input).unwrap().as_slice().iter().all(|&v| v == 0));
    }
}
