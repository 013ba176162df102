//! Benchmark sweeps: plans, the harness that runs them, and reports.

pub mod harness;
pub mod plan;
pub mod report;

pub use harness::{BenchmarkHarness, BenchmarkResult, CaseOutcome, HarnessOptions};
pub use plan::{BenchmarkCase, CompositeLevels, SweepPlan};
pub use report::{config_averages, format_line, ConfigAverage, SweepReport};
