//! Benchmark harness.
//!
//! Runs every [`BenchmarkCase`] in order. A case loads its image once,
//! builds its backend, then times `repetitions` independent runs of the
//! operation with a monotonic clock. The image and backend are dropped when
//! the case ends, so no state carries over between configurations.
//!
//! A failing case is logged and recorded as [`CaseOutcome::Failed`] in its
//! position; the sweep carries on with the next case.

use crate::bench::plan::BenchmarkCase;
use crate::core::error::{BackendError, PixbenchError, PixbenchResult, PlanError};
use crate::core::io::{load_image, save_image};
use crate::core::types::{Channels, PixelBuffer};
use crate::execution::backend::{validate_config, Backend, Executor};
use crate::execution::progress::{ProgressCallback, ProgressTracker, ProgressUpdate};
use crate::filters::{OperationRegistry, Stage, SweepSummary};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Timings for one successful case. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkResult {
    case: BenchmarkCase,
    elapsed_millis_per_run: Vec<f64>,
    average_ms: f64,
    summary: SweepSummary,
    output_path: Option<PathBuf>,
}

impl BenchmarkResult {
    /// Build a result from per-run timings; the average is their mean.
    pub fn new(case: BenchmarkCase, elapsed_millis_per_run: Vec<f64>) -> Self {
        let average_ms = if elapsed_millis_per_run.is_empty() {
            0.0
        } else {
            elapsed_millis_per_run.iter().sum::<f64>() / elapsed_millis_per_run.len() as f64
        };
        Self {
            case,
            elapsed_millis_per_run,
            average_ms,
            summary: SweepSummary::default(),
            output_path: None,
        }
    }

    fn with_summary(mut self, summary: SweepSummary) -> Self {
        self.summary = summary;
        self
    }

    fn with_output_path(mut self, path: Option<PathBuf>) -> Self {
        self.output_path = path;
        self
    }

    pub fn case(&self) -> &BenchmarkCase {
        &self.case
    }

    pub fn elapsed_millis_per_run(&self) -> &[f64] {
        &self.elapsed_millis_per_run
    }

    pub fn average_ms(&self) -> f64 {
        self.average_ms
    }

    /// Summary of the last run, merged over its stages.
    pub fn summary(&self) -> SweepSummary {
        self.summary
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }
}

/// Result of one case, in the position of the case that produced it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseOutcome {
    Completed(BenchmarkResult),
    Failed { case: BenchmarkCase, error: String },
}

impl CaseOutcome {
    pub fn case(&self) -> &BenchmarkCase {
        match self {
            CaseOutcome::Completed(result) => result.case(),
            CaseOutcome::Failed { case, .. } => case,
        }
    }

    pub fn result(&self) -> Option<&BenchmarkResult> {
        match self {
            CaseOutcome::Completed(result) => Some(result),
            CaseOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CaseOutcome::Failed { .. })
    }
}

/// Harness options.
#[derive(Clone)]
pub struct HarnessOptions {
    /// Sample layout images are decoded into.
    pub channels: Channels,
    /// Write the last output of every case here.
    pub output_dir: Option<PathBuf>,
    /// Progress callback.
    pub progress_callback: Option<Arc<ProgressCallback>>,
}

impl std::fmt::Debug for HarnessOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarnessOptions")
            .field("channels", &self.channels)
            .field("output_dir", &self.output_dir)
            .field("progress_callback", &self.progress_callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            channels: Channels::Rgb,
            output_dir: None,
            progress_callback: None,
        }
    }
}

impl HarnessOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the decode layout.
    pub fn with_channels(mut self, channels: Channels) -> Self {
        self.channels = channels;
        self
    }

    /// Materialize outputs into `dir`.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Set progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(Box::new(callback)));
        self
    }
}

/// Runs benchmark cases against an operation registry.
pub struct BenchmarkHarness {
    registry: OperationRegistry,
    options: HarnessOptions,
}

impl BenchmarkHarness {
    /// Harness over the built-in operations.
    pub fn new(options: HarnessOptions) -> Self {
        Self::with_registry(OperationRegistry::with_builtins(), options)
    }

    pub fn with_registry(registry: OperationRegistry, options: HarnessOptions) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Run every case in order.
    pub fn run(&self, cases: &[BenchmarkCase]) -> Vec<CaseOutcome> {
        let mut tracker = ProgressTracker::new(cases.len()).with_callback(self.options.progress_callback.clone());
        tracker.start();

        if let Some(dir) = &self.options.output_dir {
            if let Err(e) = std::fs::create_dir_all(dir) {
                log::warn!("Cannot create output directory {}: {}", dir.display(), e);
            }
        }

        let outcomes = cases
            .iter()
            .enumerate()
            .map(|(index, case)| {
                let started = Instant::now();
                tracker.case_started(index, case.label());
                match self.run_case(index, case, &tracker) {
                    Ok(result) => {
                        log::info!("{}: {:.3} ms average", case.label(), result.average_ms());
                        tracker.case_completed(index, result.average_ms(), started.elapsed().as_millis() as u64);
                        CaseOutcome::Completed(result)
                    }
                    Err(error) => {
                        log::warn!("{} failed: {}", case.label(), error);
                        tracker.case_failed(index, error.to_string());
                        CaseOutcome::Failed {
                            case: case.clone(),
                            error: error.to_string(),
                        }
                    }
                }
            })
            .collect();

        tracker.complete();
        outcomes
    }

    /// Load, build the backend, then time every repetition.
    fn run_case(&self, index: usize, case: &BenchmarkCase, tracker: &ProgressTracker) -> PixbenchResult<BenchmarkResult> {
        let operation = self
            .registry
            .get(&case.operation)
            .ok_or_else(|| PlanError::UnknownOperation(case.operation.clone()))?;
        if case.repetitions == 0 {
            return Err(PlanError::ZeroRepetitions.into());
        }
        validate_config(&case.config)?;

        if case.levels.is_some() && operation.stages() != [Stage::Composite] {
            return Err(BackendError::InputCount {
                stage: operation.pipeline(),
                expected: 1,
                got: 3,
            }
            .into());
        }

        let image = load_image(&case.image, self.options.channels)?;
        let levels = match &case.levels {
            Some(levels) => Some((
                load_image(&levels.half, self.options.channels)?,
                load_image(&levels.quarter, self.options.channels)?,
            )),
            None => None,
        };
        let mut executor = Executor::new(&case.config)?;

        let mut timings = Vec::with_capacity(case.repetitions);
        let mut last: Option<(PixelBuffer, SweepSummary)> = None;
        for run in 0..case.repetitions {
            let start = Instant::now();
            let (output, summary) = match &levels {
                Some((half, quarter)) => executor.run_composite(&image, half, quarter)?,
                None => executor.run_operation(operation, &image)?,
            };
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            log::debug!("{} run {}: {:.3} ms", case.label(), run + 1, elapsed_ms);
            tracker.run_completed(index, run, elapsed_ms);
            timings.push(elapsed_ms);
            last = Some((output, summary));
        }

        let (output, summary) = last.ok_or_else(|| PixbenchError::Other("no runs executed".to_string()))?;
        let output_path = match &self.options.output_dir {
            Some(dir) => {
                let path = dir.join(output_file_name(case));
                save_image(&output, &path)?;
                Some(path)
            }
            None => None,
        };

        Ok(BenchmarkResult::new(case.clone(), timings)
            .with_summary(summary)
            .with_output_path(output_path))
    }
}

/// `<backend>_<operation>_<file name>`, where the backend part is
/// `sequential`, `<n>_threads` or `gpu<index>`.
pub fn output_file_name(case: &BenchmarkCase) -> String {
    let backend = match case.config.backend {
        Backend::Sequential => "sequential".to_string(),
        Backend::ThreadPool => format!("{}_threads", case.config.thread_count),
        Backend::GpuCompute => format!("gpu{}", case.config.device_index),
    };
    format!("{}_{}_{}", backend, case.operation, case.image_name())
}
