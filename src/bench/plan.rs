//! Sweep plans.
//!
//! A plan names image globs, operations and backend configurations, and
//! expands into an ordered list of [`BenchmarkCase`]s:
//! configurations outermost, then operations, then images.
//!
//! ```toml
//! images = ["images/*.jpg"]
//! operations = ["sharpen-downscale", "binary-erosion"]
//! threads = [2, 4, 8]
//! sequential = true
//! gpu_devices = [0]
//! repetitions = 3
//!
//! # Composite cases read these levels instead of resampling the image.
//! [composite_levels]
//! half = "images/half.jpg"
//! quarter = "images/quarter.jpg"
//! ```

use crate::core::error::PlanError;
use crate::core::io::is_supported;
use crate::execution::backend::{Backend, ExecutionConfig};
use crate::filters::OperationRegistry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default thread sweep: 2, 4, ..., 16.
pub fn default_thread_counts() -> Vec<usize> {
    (2..=16).step_by(2).collect()
}

/// Operations swept when a plan does not name any.
pub const DEFAULT_OPERATIONS: [&str; 3] = ["sharpen-downscale", "emboss-downscale", "binary-erosion"];

/// Default number of timed repetitions per case.
pub const DEFAULT_REPETITIONS: usize = 3;

/// Operation that takes externally supplied pyramid levels.
pub const COMPOSITE_OPERATION: &str = "composite";

/// Half- and quarter-scale images loaded alongside the full one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompositeLevels {
    pub half: PathBuf,
    pub quarter: PathBuf,
}

impl CompositeLevels {
    pub fn new(half: impl Into<PathBuf>, quarter: impl Into<PathBuf>) -> Self {
        Self {
            half: half.into(),
            quarter: quarter.into(),
        }
    }
}

/// One configuration of one operation on one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkCase {
    pub image: PathBuf,
    pub operation: String,
    pub config: ExecutionConfig,
    pub repetitions: usize,
    /// Separate pyramid levels for a composite case.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<CompositeLevels>,
}

impl BenchmarkCase {
    pub fn new(image: impl Into<PathBuf>, operation: impl Into<String>, config: ExecutionConfig) -> Self {
        Self {
            image: image.into(),
            operation: operation.into(),
            config,
            repetitions: DEFAULT_REPETITIONS,
            levels: None,
        }
    }

    pub fn with_repetitions(mut self, repetitions: usize) -> Self {
        self.repetitions = repetitions;
        self
    }

    /// Composite against these levels instead of resampled ones.
    pub fn with_levels(mut self, levels: CompositeLevels) -> Self {
        self.levels = Some(levels);
        self
    }

    /// File name of the image, for labels and output names.
    pub fn image_name(&self) -> String {
        self.image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.image.display().to_string())
    }

    /// `operation on config: image`.
    pub fn label(&self) -> String {
        format!("{} on {}: {}", self.operation, self.config.label(), self.image_name())
    }
}

/// A sweep description, usually read from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepPlan {
    /// Image paths or glob patterns.
    pub images: Vec<String>,
    /// Operation names from the registry.
    pub operations: Vec<String>,
    /// Thread-pool sizes to sweep.
    pub threads: Vec<usize>,
    /// Include a sequential baseline before the thread-pool runs.
    pub sequential: bool,
    /// GPU adapter indices to sweep after the CPU runs.
    pub gpu_devices: Vec<usize>,
    pub repetitions: usize,
    /// External composite kernel for GPU cases.
    pub composite_kernel: Option<PathBuf>,
    /// Separate levels for every `composite` case.
    pub composite_levels: Option<CompositeLevels>,
    /// Directory for the last output of every case.
    pub output_dir: Option<PathBuf>,
}

impl Default for SweepPlan {
    fn default() -> Self {
        Self {
            images: vec!["images/*".to_string()],
            operations: DEFAULT_OPERATIONS.iter().map(|s| s.to_string()).collect(),
            threads: default_thread_counts(),
            sequential: false,
            gpu_devices: Vec::new(),
            repetitions: DEFAULT_REPETITIONS,
            composite_kernel: None,
            composite_levels: None,
            output_dir: None,
        }
    }
}

impl SweepPlan {
    /// Parse a plan from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, PlanError> {
        Ok(toml::from_str(text)?)
    }

    /// Read a plan file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Replace the image patterns.
    pub fn with_images(mut self, patterns: Vec<String>) -> Self {
        self.images = patterns;
        self
    }

    /// Check everything that does not touch the filesystem.
    pub fn validate(&self, registry: &OperationRegistry) -> Result<(), PlanError> {
        if self.repetitions == 0 {
            return Err(PlanError::ZeroRepetitions);
        }
        if let Some(unknown) = self.operations.iter().find(|op| !registry.contains(op)) {
            return Err(PlanError::UnknownOperation(unknown.clone()));
        }
        Ok(())
    }

    /// Backend configurations in sweep order.
    pub fn configurations(&self) -> Vec<ExecutionConfig> {
        let with_kernel = |config: ExecutionConfig| match &self.composite_kernel {
            Some(path) => config.with_composite_kernel(path.clone()),
            None => config,
        };

        let mut configs = Vec::new();
        if self.sequential {
            configs.push(ExecutionConfig::new(Backend::Sequential));
        }
        configs.extend(self.threads.iter().map(|&n| ExecutionConfig::thread_pool(n)));
        configs.extend(self.gpu_devices.iter().map(|&i| with_kernel(ExecutionConfig::gpu(i))));
        configs
    }

    /// Expand image patterns into sorted, de-duplicated image paths.
    pub fn resolve_images(&self) -> Result<Vec<PathBuf>, PlanError> {
        let mut images = Vec::new();
        for pattern in &self.images {
            let paths = glob::glob(pattern).map_err(|e| PlanError::Pattern {
                pattern: pattern.clone(),
                error: e.to_string(),
            })?;
            let mut matched: Vec<PathBuf> = paths
                .filter_map(|entry| match entry {
                    Ok(path) => Some(path),
                    Err(e) => {
                        log::warn!("Skipping unreadable path under `{}`: {}", pattern, e);
                        None
                    }
                })
                .filter(|path| path.is_file() && is_supported(path))
                .collect();
            matched.sort();
            for path in matched {
                if !images.contains(&path) {
                    images.push(path);
                }
            }
        }

        if images.is_empty() {
            return Err(PlanError::NoImages {
                patterns: self.images.clone(),
            });
        }
        Ok(images)
    }

    /// Validate, resolve images and build the case list.
    pub fn expand(&self, registry: &OperationRegistry) -> Result<Vec<BenchmarkCase>, PlanError> {
        self.validate(registry)?;
        let images = self.resolve_images()?;
        Ok(self.expand_with_images(&images))
    }

    /// Build the case list for already-resolved images.
    pub fn expand_with_images(&self, images: &[PathBuf]) -> Vec<BenchmarkCase> {
        let mut cases = Vec::new();
        for config in self.configurations() {
            for operation in &self.operations {
                for image in images {
                    let mut case = BenchmarkCase::new(image.clone(), operation.clone(), config.clone())
                        .with_repetitions(self.repetitions);
                    if let Some(levels) = self.composite_levels.as_ref().filter(|_| operation == COMPOSITE_OPERATION) {
                        case = case.with_levels(levels.clone());
                    }
                    cases.push(case);
                }
            }
        }
        cases
    }
}
