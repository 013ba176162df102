//! Error types for Pixbench.
//!
//! Uses thiserror for structured errors with context. Errors are designed to:
//! - Name the offending parameter so a failed benchmark case is actionable
//! - Separate input validation from device failures
//! - Support error chaining through the top-level [`PixbenchError`]

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Pixbench.
///
/// This enum encompasses all error categories and enables automatic
/// conversion between specific error types.
#[derive(Error, Debug)]
pub enum PixbenchError {
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Input validation errors raised by the pixel engines.
///
/// These are detected before any output buffer is allocated and abort only
/// the offending case.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransformError {
    #[error("Invalid kernel: size {size} ({reason})")]
    InvalidKernel { size: i64, reason: String },

    #[error("Invalid image {width}x{height}x{channels}: {reason}")]
    InvalidImage {
        width: u32,
        height: u32,
        channels: u8,
        reason: String,
    },

    #[error("Invalid erosion radius {0}: must be >= 0")]
    InvalidRadius(i64),

    #[error("Scale factor {scale} turns {width}x{height} into a degenerate image")]
    DegenerateSize { width: u32, height: u32, scale: f64 },
}

/// Errors from the GPU compute pipeline.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceError {
    #[error("No compute device at index {index} ({available} available)")]
    DeviceUnavailable { index: usize, available: usize },

    #[error("Device request failed: {0}")]
    DeviceRequest(String),

    #[error("Failed to read kernel source {path}: {error}")]
    KernelSource { path: PathBuf, error: String },

    #[error("Program build failed for entry point '{entry_point}':\n{log}")]
    Build { entry_point: String, log: String },

    #[error("Device execution failed: {0}")]
    Execution(String),
}

/// Errors from backend configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Thread count must be at least 1, got {0}")]
    InvalidThreadCount(usize),

    #[error("Failed to build thread pool: {0}")]
    ThreadPool(String),

    #[error("Stage '{stage}' expects {expected} input image(s), got {got}")]
    InputCount {
        stage: String,
        expected: usize,
        got: usize,
    },
}

/// Errors while loading or expanding a benchmark plan.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Failed to parse plan: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid image pattern '{pattern}': {error}")]
    Pattern { pattern: String, error: String },

    #[error("No input images found matching: {patterns:?}")]
    NoImages { patterns: Vec<String> },

    #[error("Unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("Unknown backend '{0}' (expected sequential, threadpool or gpu)")]
    UnknownBackend(String),

    #[error("Repetitions must be at least 1")]
    ZeroRepetitions,

    #[error("Plan I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Error Utilities
// ============================================================================

impl TransformError {
    /// Name of the parameter that failed validation.
    pub fn parameter(&self) -> &'static str {
        match self {
            TransformError::InvalidKernel { .. } => "kernel",
            TransformError::InvalidImage { .. } => "image",
            TransformError::InvalidRadius(_) => "radius",
            TransformError::DegenerateSize { .. } => "scale",
        }
    }
}

impl DeviceError {
    /// Build log carried by a program build failure.
    pub fn build_log(&self) -> Option<&str> {
        match self {
            DeviceError::Build { log, .. } => Some(log),
            _ => None,
        }
    }
}

/// Result type alias for Pixbench operations.
pub type PixbenchResult<T> = Result<T, PixbenchError>;

/// Result type alias for pixel transforms.
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type alias for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_error_parameter() {
        let error = TransformError::InvalidRadius(-1);
        assert_eq!(error.parameter(), "radius");
        assert!(error.to_string().contains("-1"));
    }

    #[test]
    fn test_build_log_accessor() {
        let error = DeviceError::Build {
            entry_point: "combine_images".to_string(),
            log: "error: expected ';'".to_string(),
        };
        assert_eq!(error.build_log(), Some("error: expected ';'"));
        assert!(DeviceError::Execution("lost".into()).build_log().is_none());
    }

    #[test]
    fn test_conversion_to_top_level() {
        let error: PixbenchError = TransformError::DegenerateSize {
            width: 1,
            height: 1,
            scale: 0.5,
        }
        .into();
        assert!(matches!(error, PixbenchError::Transform(_)));
    }
}
