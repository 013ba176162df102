//! Lowering of stages onto the GPU pipeline.
//!
//! Shapes are validated with the same [`RowSweep`] implementations the CPU
//! backends use, so a stage fails with the same `TransformError` on every
//! backend before any device buffer is created.

use crate::core::error::PixbenchResult;
use crate::core::gpu::{DispatchParams, DispatchRequest, GpuPipeline, KernelSource};
use crate::core::types::PixelBuffer;
use crate::execution::backend::ExecutionConfig;
use crate::filters::convolution::BorderPolicy;
use crate::filters::resample::source_indices;
use crate::filters::{
    CompositeSweep, ConvolutionSweep, ErosionSweep, GrayscaleSweep, OutputShape, ResizeSweep, RowSweep, SobelSweep,
    Stage, ThresholdSweep,
};
use std::borrow::Cow;

/// Runs stages on one device context.
pub struct GpuExecutor {
    pipeline: GpuPipeline,
    composite: KernelSource,
}

impl GpuExecutor {
    /// Load the composite kernel and open the configured device.
    pub fn new(config: &ExecutionConfig) -> PixbenchResult<Self> {
        let composite = match &config.composite_kernel {
            Some(path) => KernelSource::composite_from_file(path)?,
            None => KernelSource::default_composite(),
        };
        let pipeline = GpuPipeline::new(config.device_index)?;
        log::info!("GPU backend on {}", pipeline.adapter());
        Ok(Self { pipeline, composite })
    }

    pub fn pipeline(&self) -> &GpuPipeline {
        &self.pipeline
    }

    /// Run one stage and collect its output.
    pub fn run_stage(&mut self, stage: &Stage, input: &PixelBuffer) -> PixbenchResult<PixelBuffer> {
        match stage {
            Stage::Convolve { kernel, border } => {
                let shape = ConvolutionSweep::new(kernel.clone(), *border).output_shape(input)?;
                let params = DispatchParams {
                    param0: kernel.size() as u32,
                    param1: match border {
                        BorderPolicy::Zero => 0,
                        BorderPolicy::CopyInput => 1,
                    },
                    ..grid(&shape, input.channel_count())
                };
                let weights: &[u8] = bytemuck::cast_slice(kernel.weights());
                self.dispatch("convolve", &shape, params, vec![input.as_slice().into(), weights.into()])
            }
            Stage::Sobel => {
                let shape = SobelSweep.output_shape(input)?;
                let params = grid(&shape, input.channel_count());
                self.dispatch("sobel", &shape, params, vec![input.as_slice().into()])
            }
            Stage::Erode(element) => {
                let shape = ErosionSweep::new(*element).output_shape(input)?;
                let params = DispatchParams {
                    param0: erosion_radius(element.radius(), &shape),
                    ..grid(&shape, 1)
                };
                self.dispatch("erode", &shape, params, vec![input.as_slice().into()])
            }
            Stage::Resize { scale } => self.resize(input, *scale),
            Stage::Grayscale => {
                let shape = GrayscaleSweep.output_shape(input)?;
                let params = grid(&shape, input.channel_count());
                self.dispatch("grayscale", &shape, params, vec![input.as_slice().into()])
            }
            Stage::Threshold { level } => {
                let shape = ThresholdSweep::new(*level).output_shape(input)?;
                let params = DispatchParams {
                    param0: *level as u32,
                    ..grid(&shape, input.channel_count())
                };
                self.dispatch("threshold", &shape, params, vec![input.as_slice().into()])
            }
            Stage::Composite => {
                let half = self.resize(input, 0.5)?;
                let quarter = self.resize(&half, 0.5)?;
                self.composite_levels(input, &half, &quarter)
            }
        }
    }

    /// Bind three levels as the composite kernel's inputs and run it once.
    pub fn composite_levels(
        &mut self,
        full: &PixelBuffer,
        half: &PixelBuffer,
        quarter: &PixelBuffer,
    ) -> PixbenchResult<PixelBuffer> {
        let shape = CompositeSweep::new(half, quarter).output_shape(full)?;
        let params = DispatchParams {
            param0: half.width(),
            param1: half.height(),
            param2: quarter.width(),
            param3: quarter.height(),
            ..grid(&shape, full.channel_count())
        };
        let request = DispatchRequest {
            inputs: vec![full.as_slice().into(), half.as_slice().into(), quarter.as_slice().into()],
            output_len: shape.row_stride() * shape.height as usize,
            params,
        };
        let samples = self.pipeline.run(&self.composite, &request)?;
        Ok(PixelBuffer::from_samples(shape.width, shape.height, shape.channels, samples)?)
    }

    fn resize(&mut self, input: &PixelBuffer, scale: f64) -> PixbenchResult<PixelBuffer> {
        let shape = ResizeSweep::new(scale).output_shape(input)?;
        let xs = source_indices(shape.width, input.width(), scale);
        let ys = source_indices(shape.height, input.height(), scale);
        let params = DispatchParams {
            param0: input.width(),
            param1: input.height(),
            ..grid(&shape, input.channel_count())
        };
        let inputs: Vec<Cow<'_, [u8]>> = vec![
            input.as_slice().into(),
            bytemuck::cast_slice::<u32, u8>(&xs).into(),
            bytemuck::cast_slice::<u32, u8>(&ys).into(),
        ];
        self.dispatch("resize", &shape, params, inputs)
    }

    fn dispatch(
        &mut self,
        entry_point: &str,
        shape: &OutputShape,
        params: DispatchParams,
        inputs: Vec<Cow<'_, [u8]>>,
    ) -> PixbenchResult<PixelBuffer> {
        let request = DispatchRequest {
            inputs,
            output_len: shape.row_stride() * shape.height as usize,
            params,
        };
        let samples = self.pipeline.run(&KernelSource::stage(entry_point), &request)?;
        Ok(PixelBuffer::from_samples(shape.width, shape.height, shape.channels, samples)?)
    }
}

/// Erosion radius as sent to the device.
///
/// A window wider than the image covers all of it, so the radius is capped at
/// the larger side. This keeps `x + r` inside `u32` in the kernel.
fn erosion_radius(radius: u32, shape: &OutputShape) -> u32 {
    radius.min(shape.width.max(shape.height))
}

/// Base parameters covering the output grid.
fn grid(shape: &OutputShape, channels: usize) -> DispatchParams {
    DispatchParams {
        width: shape.width,
        height: shape.height,
        channels: channels as u32,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Channels, StructuringElement};
    use crate::execution::backend::{apply, apply_composite};
    use crate::filters::composite;

    fn open() -> Option<GpuExecutor> {
        if crate::core::gpu::list_devices().is_empty() {
            return None;
        }
        GpuExecutor::new(&ExecutionConfig::gpu(0)).ok()
    }

    fn level(width: u32, height: u32, seed: u32) -> PixelBuffer {
        PixelBuffer::from_fn(width, height, Channels::Rgb, |x, y, c| {
            ((x * 13 + y * 7 + c as u32 * 31 + seed) % 256) as u8
        })
        .unwrap()
    }

    #[test]
    fn test_erosion_radius_capped_at_image_side() {
        let shape = OutputShape {
            width: 40,
            height: 25,
            channels: Channels::Gray,
        };
        assert_eq!(erosion_radius(2, &shape), 2);
        assert_eq!(erosion_radius(u32::MAX, &shape), 40);
    }

    #[test]
    fn test_separate_levels_match_cpu() {
        let Some(mut gpu) = open() else {
            return;
        };
        // Levels that are not resamples of the full image.
        let full = level(37, 29, 0);
        let half = level(18, 14, 90);
        let quarter = level(9, 7, 170);
        let expected = composite(&full, &half, &quarter).unwrap();
        assert_eq!(gpu.composite_levels(&full, &half, &quarter).unwrap(), expected);
        assert_eq!(apply_composite(&full, &half, &quarter, &ExecutionConfig::gpu(0)).unwrap(), expected);
    }

    #[test]
    fn test_huge_erosion_radius_matches_cpu() {
        let Some(mut gpu) = open() else {
            return;
        };
        let mask = PixelBuffer::from_fn(20, 12, Channels::Gray, |x, y, _| if (x + y) % 9 == 0 { 0 } else { 255 }).unwrap();
        let stage = Stage::Erode(StructuringElement::new(u32::MAX as i64).unwrap());
        let expected = apply(&stage, &mask, &ExecutionConfig::sequential()).unwrap();
        assert_eq!(gpu.run_stage(&stage, &mask).unwrap(), expected);
    }
}
