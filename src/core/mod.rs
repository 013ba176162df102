//! Core types for the Pixbench transform engine.
//!
//! This module contains the foundational pieces every stage builds on:
//! - Pixel buffers, kernels and structuring elements
//! - Error types
//! - Image file adapters
//! - The GPU compute pipeline

pub mod error;
pub mod gpu;
pub mod io;
pub mod types;

// Re-export commonly used types
pub use error::{BackendError, DeviceError, PixbenchError, PixbenchResult, PlanError, TransformError, TransformResult};
pub use gpu::{list_devices, AdapterSummary, GpuPipeline, KernelSource, PipelineState};
pub use io::{load_image, save_image};
pub use types::{Channels, Kernel, PixelBuffer, StructuringElement};
