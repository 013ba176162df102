//! Execution backends.
//!
//! Every backend runs the same [`Stage`] semantics. `Sequential` is the
//! reference; `ThreadPool` splits each sweep into disjoint row bands on a
//! bounded pool and produces identical bytes; `GpuCompute` lowers the stage
//! onto a device kernel.

use crate::core::error::{BackendError, PixbenchError, PixbenchResult, PlanError};
use crate::core::types::PixelBuffer;
use crate::execution::device::GpuExecutor;
use crate::execution::parallel::{build_pool, sweep_parallel};
use crate::filters::{
    sweep_sequential, CompositeSweep, ConvolutionSweep, ErosionSweep, GrayscaleSweep, Operation, ResizeSweep,
    RowSweep, SobelSweep, Stage, SweepSummary, ThresholdSweep,
};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Where a stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Single-threaded reference.
    Sequential,
    /// Bounded CPU worker pool.
    ThreadPool,
    /// Device compute kernel.
    GpuCompute,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Sequential => "sequential",
            Backend::ThreadPool => "thread_pool",
            Backend::GpuCompute => "gpu_compute",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "sequential" | "seq" => Ok(Backend::Sequential),
            "thread_pool" | "threads" | "pool" => Ok(Backend::ThreadPool),
            "gpu_compute" | "gpu" => Ok(Backend::GpuCompute),
            _ => Err(PlanError::UnknownBackend(s.to_string())),
        }
    }
}

/// Backend selection and its knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub backend: Backend,
    /// Worker count, used by `ThreadPool` only.
    pub thread_count: usize,
    /// Adapter index, used by `GpuCompute` only.
    pub device_index: usize,
    /// External composite kernel; the bundled one is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_kernel: Option<PathBuf>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sequential,
            thread_count: 1,
            device_index: 0,
            composite_kernel: None,
        }
    }
}

impl ExecutionConfig {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    pub fn sequential() -> Self {
        Self::new(Backend::Sequential)
    }

    pub fn thread_pool(threads: usize) -> Self {
        Self::new(Backend::ThreadPool).with_threads(threads)
    }

    pub fn gpu(device_index: usize) -> Self {
        Self::new(Backend::GpuCompute).with_device(device_index)
    }

    /// Set the worker count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.thread_count = threads;
        self
    }

    /// Set the adapter index.
    pub fn with_device(mut self, index: usize) -> Self {
        self.device_index = index;
        self
    }

    /// Use an external composite kernel.
    pub fn with_composite_kernel(mut self, path: impl Into<PathBuf>) -> Self {
        self.composite_kernel = Some(path.into());
        self
    }

    /// Thread count that applies to this backend, for reports.
    pub fn effective_threads(&self) -> usize {
        match self.backend {
            Backend::ThreadPool => self.thread_count,
            Backend::Sequential | Backend::GpuCompute => 1,
        }
    }

    /// Short label such as `thread_pool(8)`.
    pub fn label(&self) -> String {
        match self.backend {
            Backend::Sequential => "sequential".to_string(),
            Backend::ThreadPool => format!("thread_pool({})", self.thread_count),
            Backend::GpuCompute => format!("gpu_compute(#{})", self.device_index),
        }
    }
}

/// A configured backend, ready to run stages.
///
/// Creating one builds the worker pool or opens the device; reuse it for
/// every stage and repetition of the same configuration.
pub enum Executor {
    Sequential,
    ThreadPool(rayon::ThreadPool),
    Gpu(Box<GpuExecutor>),
}

impl Executor {
    pub fn new(config: &ExecutionConfig) -> PixbenchResult<Self> {
        match config.backend {
            Backend::Sequential => Ok(Executor::Sequential),
            Backend::ThreadPool => Ok(Executor::ThreadPool(build_pool(config.thread_count)?)),
            Backend::GpuCompute => Ok(Executor::Gpu(Box::new(GpuExecutor::new(config)?))),
        }
    }

    /// Run one stage.
    ///
    /// The GPU summary is computed from the read-back output and never
    /// reports clamped samples.
    pub fn run_stage(&mut self, stage: &Stage, input: &PixelBuffer) -> PixbenchResult<(PixelBuffer, SweepSummary)> {
        if let Executor::Gpu(gpu) = self {
            let output = gpu.run_stage(stage, input)?;
            let summary = SweepSummary::of_samples(output.as_slice());
            return Ok((output, summary));
        }

        match stage {
            Stage::Convolve { kernel, border } => self.sweep(&ConvolutionSweep::new(kernel.clone(), *border), input),
            Stage::Sobel => self.sweep(&SobelSweep, input),
            Stage::Erode(element) => self.sweep(&ErosionSweep::new(*element), input),
            Stage::Resize { scale } => self.sweep(&ResizeSweep::new(*scale), input),
            Stage::Grayscale => self.sweep(&GrayscaleSweep, input),
            Stage::Threshold { level } => self.sweep(&ThresholdSweep::new(*level), input),
            Stage::Composite => {
                let (half, _) = self.sweep(&ResizeSweep::new(0.5), input)?;
                let (quarter, _) = self.sweep(&ResizeSweep::new(0.5), &half)?;
                self.sweep(&CompositeSweep::new(&half, &quarter), input)
            }
        }
    }

    /// Combine three separately supplied pyramid levels in one pass.
    ///
    /// `half` and `quarter` are used as given; nothing is resampled.
    pub fn run_composite(
        &mut self,
        full: &PixelBuffer,
        half: &PixelBuffer,
        quarter: &PixelBuffer,
    ) -> PixbenchResult<(PixelBuffer, SweepSummary)> {
        if let Executor::Gpu(gpu) = self {
            let output = gpu.composite_levels(full, half, quarter)?;
            let summary = SweepSummary::of_samples(output.as_slice());
            return Ok((output, summary));
        }
        self.sweep(&CompositeSweep::new(half, quarter), full)
    }

    /// Run every stage of an operation, passing each output on.
    pub fn run_operation(
        &mut self,
        operation: &Operation,
        input: &PixelBuffer,
    ) -> PixbenchResult<(PixelBuffer, SweepSummary)> {
        let mut stages = operation.stages().iter();
        let first = stages.next().ok_or_else(|| {
            PixbenchError::Other(format!("operation `{}` has no stages", operation.name()))
        })?;
        let (mut current, mut summary) = self.run_stage(first, input)?;
        for stage in stages {
            let (next, stage_summary) = self.run_stage(stage, &current)?;
            current = next;
            summary = summary.merge(stage_summary);
        }
        Ok((current, summary))
    }

    fn sweep(&self, sweep: &dyn RowSweep, input: &PixelBuffer) -> PixbenchResult<(PixelBuffer, SweepSummary)> {
        let result = match self {
            Executor::ThreadPool(pool) => sweep_parallel(pool, sweep, input)?,
            Executor::Sequential | Executor::Gpu(_) => sweep_sequential(sweep, input)?,
        };
        Ok(result)
    }
}

/// Apply one stage under `config`.
pub fn apply(stage: &Stage, input: &PixelBuffer, config: &ExecutionConfig) -> PixbenchResult<PixelBuffer> {
    apply_with_summary(stage, input, config).map(|(output, _)| output)
}

/// Apply one stage and return its summary as well.
pub fn apply_with_summary(
    stage: &Stage,
    input: &PixelBuffer,
    config: &ExecutionConfig,
) -> PixbenchResult<(PixelBuffer, SweepSummary)> {
    Executor::new(config)?.run_stage(stage, input)
}

/// Apply a whole operation under `config`.
pub fn apply_operation(
    operation: &Operation,
    input: &PixelBuffer,
    config: &ExecutionConfig,
) -> PixbenchResult<PixelBuffer> {
    Executor::new(config)?.run_operation(operation, input).map(|(output, _)| output)
}

/// Composite three externally loaded levels under `config`.
pub fn apply_composite(
    full: &PixelBuffer,
    half: &PixelBuffer,
    quarter: &PixelBuffer,
    config: &ExecutionConfig,
) -> PixbenchResult<PixelBuffer> {
    Executor::new(config)?
        .run_composite(full, half, quarter)
        .map(|(output, _)| output)
}

/// Outputs of a batch plus the combined summary of all images.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub outputs: Vec<PixelBuffer>,
    pub total: SweepSummary,
}

/// Apply one stage to a set of images.
///
/// Under `ThreadPool` the images themselves are spread over the pool and
/// each is swept on a single worker. The batch total is merged into one
/// mutex-guarded accumulator as each image finishes.
pub fn apply_batch(stage: &Stage, inputs: &[PixelBuffer], config: &ExecutionConfig) -> PixbenchResult<BatchOutput> {
    let total = Mutex::new(SweepSummary::default());
    let mut executor = Executor::new(config)?;

    let outputs = if let Executor::ThreadPool(pool) = &executor {
        pool.install(|| {
            inputs
                .par_iter()
                .map(|input| -> PixbenchResult<PixelBuffer> {
                    let (output, summary) = Executor::Sequential.run_stage(stage, input)?;
                    let mut acc = total.lock();
                    *acc = acc.merge(summary);
                    Ok(output)
                })
                .collect::<PixbenchResult<Vec<_>>>()
        })?
    } else {
        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            let (output, summary) = executor.run_stage(stage, input)?;
            let mut acc = total.lock();
            *acc = acc.merge(summary);
            outputs.push(output);
        }
        outputs
    };

    log::debug!("Batch of {} images through {} on {}", inputs.len(), stage, config.label());
    Ok(BatchOutput {
        outputs,
        total: total.into_inner(),
    })
}

/// Reject configurations that can never run.
pub fn validate_config(config: &ExecutionConfig) -> Result<(), BackendError> {
    if config.backend == Backend::ThreadPool && config.thread_count == 0 {
        return Err(BackendError::InvalidThreadCount(0));
    }
    Ok(())
}
