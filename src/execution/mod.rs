//! Execution backends.
//!
//! This module runs stages and operations on the sequential, thread-pool and
//! GPU backends, and reports sweep progress.

pub mod backend;
pub mod device;
pub mod parallel;
pub mod progress;

pub use backend::{
    apply, apply_batch, apply_composite, apply_operation, apply_with_summary, Backend, BatchOutput, ExecutionConfig,
    Executor,
};
pub use device::GpuExecutor;
pub use parallel::{build_pool, sweep_parallel};
pub use progress::{ProgressCallback, ProgressTracker, ProgressUpdate};
