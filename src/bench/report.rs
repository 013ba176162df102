//! Text and JSON reports for sweep outcomes.

use crate::bench::harness::CaseOutcome;
use crate::core::error::PixbenchResult;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::Path;

/// One plain-text line per case.
pub fn format_line(outcome: &CaseOutcome) -> String {
    let case = outcome.case();
    match outcome {
        CaseOutcome::Completed(result) => format!(
            "{:<20} {:<18} {:<24} {:>10.3} ms (avg of {})",
            case.operation,
            case.config.label(),
            case.image_name(),
            result.average_ms(),
            result.elapsed_millis_per_run().len()
        ),
        CaseOutcome::Failed { error, .. } => format!(
            "{:<20} {:<18} {:<24} FAILED: {}",
            case.operation,
            case.config.label(),
            case.image_name(),
            error
        ),
    }
}

/// Average latency of one operation on one configuration, across images.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigAverage {
    pub operation: String,
    pub config: String,
    pub threads: usize,
    pub images: usize,
    pub failed: usize,
    pub average_ms: f64,
}

/// Group outcomes by (operation, configuration) in first-seen order.
pub fn config_averages(outcomes: &[CaseOutcome]) -> Vec<ConfigAverage> {
    let mut groups: IndexMap<(String, String), ConfigAverage> = IndexMap::new();
    for outcome in outcomes {
        let case = outcome.case();
        let key = (case.operation.clone(), case.config.label());
        let entry = groups.entry(key).or_insert_with(|| ConfigAverage {
            operation: case.operation.clone(),
            config: case.config.label(),
            threads: case.config.effective_threads(),
            images: 0,
            failed: 0,
            average_ms: 0.0,
        });
        match outcome.result() {
            Some(result) => {
                // Running mean over completed images.
                entry.images += 1;
                entry.average_ms += (result.average_ms() - entry.average_ms) / entry.images as f64;
            }
            None => entry.failed += 1,
        }
    }
    groups.into_values().collect()
}

/// Everything a sweep produced, ready for `serde_json`.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport<'a> {
    pub tool: &'static str,
    pub version: &'static str,
    pub completed: usize,
    pub failed: usize,
    pub averages: Vec<ConfigAverage>,
    pub cases: &'a [CaseOutcome],
}

impl<'a> SweepReport<'a> {
    pub fn new(outcomes: &'a [CaseOutcome]) -> Self {
        let failed = outcomes.iter().filter(|o| o.is_failed()).count();
        Self {
            tool: crate::NAME,
            version: crate::VERSION,
            completed: outcomes.len() - failed,
            failed,
            averages: config_averages(outcomes),
            cases: outcomes,
        }
    }

    pub fn to_json(&self) -> PixbenchResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> PixbenchResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::harness::BenchmarkResult;
    use crate::bench::plan::BenchmarkCase;
    use crate::execution::backend::ExecutionConfig;

    fn outcomes() -> Vec<CaseOutcome> {
        let config = ExecutionConfig::thread_pool(4);
        vec![
            CaseOutcome::Completed(BenchmarkResult::new(
                BenchmarkCase::new("a.png", "emboss-downscale", config.clone()),
                vec![1.0, 2.0, 3.0],
            )),
            CaseOutcome::Completed(BenchmarkResult::new(
                BenchmarkCase::new("b.png", "emboss-downscale", config.clone()),
                vec![4.0, 4.0, 4.0],
            )),
            CaseOutcome::Failed {
                case: BenchmarkCase::new("c.png", "emboss-downscale", config),
                error: "decode failed".to_string(),
            },
        ]
    }

    #[test]
    fn test_format_lines() {
        let outcomes = outcomes();
        let line = format_line(&outcomes[0]);
        assert!(line.contains("emboss-downscale"));
        assert!(line.contains("thread_pool(4)"));
        assert!(line.contains("2.000 ms"));
        assert!(format_line(&outcomes[2]).contains("FAILED: decode failed"));
    }

    #[test]
    fn test_config_averages() {
        let averages = config_averages(&outcomes());
        assert_eq!(averages.len(), 1);
        assert_eq!(averages[0].images, 2);
        assert_eq!(averages[0].failed, 1);
        assert_eq!(averages[0].threads, 4);
        assert!((averages[0].average_ms - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_json_report() {
        let outcomes = outcomes();
        let report = SweepReport::new(&outcomes);
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["completed"], 2);
        assert_eq!(value["failed"], 1);
        assert_eq!(value["cases"][0]["status"], "completed");
        assert_eq!(value["cases"][0]["elapsed_millis_per_run"].as_array().unwrap().len(), 3);
        assert_eq!(value["cases"][2]["status"], "failed");
        assert_eq!(value["cases"][2]["case"]["config"]["backend"], "thread_pool");
    }

    #[test]
    fn test_write_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let outcomes = outcomes();
        SweepReport::new(&outcomes).write_json(&path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("\"tool\""));
    }
}
