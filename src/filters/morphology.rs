//! Binary erosion with a square structuring element.
//!
//! A pixel stays foreground (255) only when every in-bounds neighbour in its
//! (2r+1)² window is 255. Neighbours that fall outside the image are treated
//! as foreground and never erode the centre, so a fully white image keeps
//! its edges.

use crate::core::error::{TransformError, TransformResult};
use crate::core::types::{Channels, PixelBuffer, StructuringElement};
use crate::filters::{sweep_sequential, OutputShape, RowSweep, SweepSummary};

/// Foreground sample value.
pub const FOREGROUND: u8 = 255;

/// Background sample value.
pub const BACKGROUND: u8 = 0;

/// Erode a single-channel image with a square window of half-width `radius`.
pub fn erode(input: &PixelBuffer, radius: i64) -> TransformResult<PixelBuffer> {
    let element = StructuringElement::new(radius)?;
    erode_with(input, element)
}

/// Erode with a pre-validated structuring element.
pub fn erode_with(input: &PixelBuffer, element: StructuringElement) -> TransformResult<PixelBuffer> {
    sweep_sequential(&ErosionSweep::new(element), input).map(|(output, _)| output)
}

/// Row-band evaluator for erosion.
#[derive(Debug, Clone, Copy)]
pub struct ErosionSweep {
    element: StructuringElement,
}

impl ErosionSweep {
    pub fn new(element: StructuringElement) -> Self {
        Self { element }
    }

    pub fn element(&self) -> StructuringElement {
        self.element
    }
}

impl RowSweep for ErosionSweep {
    fn name(&self) -> &'static str {
        "erode"
    }

    fn output_shape(&self, input: &PixelBuffer) -> TransformResult<OutputShape> {
        if input.channels() != Channels::Gray {
            return Err(TransformError::InvalidImage {
                width: input.width(),
                height: input.height(),
                channels: input.channel_count() as u8,
                reason: "erosion requires a single-channel image".to_string(),
            });
        }
        Ok(OutputShape {
            width: input.width(),
            height: input.height(),
            channels: Channels::Gray,
        })
    }

    fn sweep_rows(&self, input: &PixelBuffer, first_row: usize, band: &mut [u8]) -> SweepSummary {
        let src = input.as_slice();
        let w = input.width() as usize;
        let h = input.height() as usize;
        let r = self.element.radius() as usize;

        for (offset, out_row) in band.chunks_exact_mut(w).enumerate() {
            let y = first_row + offset;
            let y0 = y.saturating_sub(r);
            let y1 = (y + r).min(h - 1);

            for (x, out) in out_row.iter_mut().enumerate() {
                let x0 = x.saturating_sub(r);
                let x1 = (x + r).min(w - 1);
                let keep = (y0..=y1).all(|yy| {
                    src[yy * w + x0..=yy * w + x1]
                        .iter()
                        .all(|&v| v == FOREGROUND)
                });
                *out = if keep { FOREGROUND } else { BACKGROUND };
            }
        }

        SweepSummary::of_samples(band)
    }
}
