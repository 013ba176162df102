//! # Pixbench - Image transform execution engine
//!
//! Pixbench applies spatial filters (convolution, binary erosion) and
//! nearest-neighbour resampling to raster images under interchangeable
//! backends, and measures how they perform across a configuration sweep.
//!
//! ## Features
//!
//! - **Pixel engines**: convolution with explicit border policy, binary
//!   erosion, resampling, grayscale, threshold and a multi-resolution composite
//! - **Backends**: sequential reference, row-band parallel on a bounded rayon
//!   pool (bit-exact with the reference), and wgpu compute kernels
//! - **Sweeps**: TOML plans expanded over images × operations × backends,
//!   timed per repetition and reported as text or JSON
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pixbench::prelude::*;
//!
//! let registry = OperationRegistry::with_builtins();
//! let op = registry.get("sharpen-downscale").unwrap();
//!
//! let image = load_image("input.png", Channels::Rgb)?;
//! let output = apply_operation(op, &image, &ExecutionConfig::thread_pool(8))?;
//! save_image(&output, "output.png")?;
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: pixel buffers, kernels, errors, image I/O and the GPU pipeline
//! - [`filters`]: row-sweep engines and the operation registry
//! - [`execution`]: backends, parallel sweeps and progress tracking
//! - [`bench`]: sweep plans, the benchmark harness and reports

#![warn(clippy::all)]

pub mod bench;
pub mod core;
pub mod execution;
pub mod filters;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use pixbench::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::types::{Channels, Kernel, PixelBuffer, StructuringElement};

    // Errors
    pub use crate::core::error::{
        BackendError, DeviceError, PixbenchError, PixbenchResult, PlanError, TransformError,
    };

    // I/O
    pub use crate::core::io::{load_image, save_image};

    // GPU
    pub use crate::core::gpu::{list_devices, AdapterSummary, GpuPipeline, KernelSource, PipelineState};

    // Engines
    pub use crate::filters::{
        composite, composite_pyramid, convolve, convolve_with_border, erode, grayscale, resize, sobel, threshold,
        BorderPolicy, Operation, OperationRegistry, Stage, SweepSummary,
    };

    // Execution
    pub use crate::execution::{
        apply, apply_batch, apply_composite, apply_operation, apply_with_summary, Backend, ExecutionConfig,
        ProgressUpdate,
    };

    // Benchmarks
    pub use crate::bench::{
        BenchmarkCase, BenchmarkHarness, CaseOutcome, CompositeLevels, HarnessOptions, SweepPlan, SweepReport,
    };
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
        assert_eq!(super::NAME, "pixbench");
    }

    #[test]
    fn test_sharpen_downscale_end_to_end() {
        let registry = OperationRegistry::with_builtins();
        let op = registry.get("sharpen-downscale").unwrap();
        let image = PixelBuffer::filled(100, 100, Channels::Rgb, 40).unwrap();
        let output = apply_operation(op, &image, &ExecutionConfig::thread_pool(4)).unwrap();
        assert_eq!((output.width(), output.height()), (50, 50));
        // Flat interior: 9*40 - 8*40 = 40. Output row 0 samples the unswept zero frame.
        assert_eq!(output.sample(10, 10, 0), Some(40));
        assert_eq!(output.sample(10, 0, 0), Some(0));
    }

    #[test]
    fn test_copy_input_border_keeps_edge_samples() {
        let image = PixelBuffer::filled(6, 6, Channels::Gray, 40).unwrap();
        let stage = Stage::Convolve {
            kernel: Kernel::sharpen(),
            border: BorderPolicy::CopyInput,
        };
        let output = apply(&stage, &image, &ExecutionConfig::thread_pool(3)).unwrap();
        assert_eq!(output.sample(3, 0, 0), Some(40));
        assert_eq!(output.sample(3, 3, 0), Some(40));
    }

    #[test]
    fn test_sobel_downscale_step_edge_across_backends() {
        let registry = OperationRegistry::with_builtins();
        let op = registry.get("sobel-downscale").unwrap();
        let image = PixelBuffer::from_fn(40, 20, Channels::Rgb, |x, _, _| if x < 21 { 30 } else { 90 }).unwrap();
        let sequential = apply_operation(op, &image, &ExecutionConfig::sequential()).unwrap();
        let pooled = apply_operation(op, &image, &ExecutionConfig::thread_pool(4)).unwrap();
        assert_eq!(sequential, pooled);
        assert_eq!((sequential.width(), sequential.height(), sequential.channels()), (20, 10, Channels::Gray));
        // Output column 10 samples input column 20, next to the rising edge.
        assert!(sequential.sample(10, 5, 0).unwrap() > 0);
        assert_eq!(sequential.sample(3, 5, 0), Some(0));
        assert_eq!(sequential.sample(16, 5, 0), Some(0));
    }
}
