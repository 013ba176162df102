//! Progress tracking for benchmark sweeps.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A progress update event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// A case has loaded its image and is about to run.
    CaseStarted {
        index: usize,
        total: usize,
        label: String,
    },
    /// One timed repetition finished.
    RunCompleted {
        index: usize,
        run: usize,
        elapsed_ms: f64,
    },
    /// Every repetition of a case finished.
    CaseCompleted {
        index: usize,
        average_ms: f64,
    },
    /// A case failed; the sweep moves on.
    CaseFailed {
        index: usize,
        message: String,
    },
    /// Overall progress percentage.
    Progress {
        percent: f32,
        elapsed_ms: u64,
        estimated_remaining_ms: Option<u64>,
    },
    /// The sweep has finished.
    SweepCompleted {
        total_duration_ms: u64,
        completed: usize,
        failed: usize,
    },
}

/// Callback type for progress updates.
pub type ProgressCallback = Box<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Counts finished cases and forwards events to an optional callback.
pub struct ProgressTracker {
    total_cases: usize,
    completed_cases: AtomicU64,
    failed_cases: AtomicU64,
    start_time: Option<Instant>,
    callback: Option<Arc<ProgressCallback>>,
    /// Wall time per finished case, for estimation.
    case_times: Mutex<Vec<u64>>,
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new(total_cases: usize) -> Self {
        Self {
            total_cases,
            completed_cases: AtomicU64::new(0),
            failed_cases: AtomicU64::new(0),
            start_time: None,
            callback: None,
            case_times: Mutex::new(Vec::new()),
        }
    }

    /// Set a callback for progress updates.
    pub fn with_callback(mut self, callback: Option<Arc<ProgressCallback>>) -> Self {
        self.callback = callback;
        self
    }

    /// Start tracking.
    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
    }

    pub fn case_started(&self, index: usize, label: String) {
        self.send_update(ProgressUpdate::CaseStarted {
            index,
            total: self.total_cases,
            label,
        });
    }

    pub fn run_completed(&self, index: usize, run: usize, elapsed_ms: f64) {
        self.send_update(ProgressUpdate::RunCompleted { index, run, elapsed_ms });
    }

    /// Report a finished case with its wall time, including untimed setup.
    pub fn case_completed(&self, index: usize, average_ms: f64, wall_ms: u64) {
        self.completed_cases.fetch_add(1, Ordering::Relaxed);
        self.case_times.lock().push(wall_ms);
        self.send_update(ProgressUpdate::CaseCompleted { index, average_ms });
        self.send_progress_update();
    }

    pub fn case_failed(&self, index: usize, message: String) {
        self.failed_cases.fetch_add(1, Ordering::Relaxed);
        self.send_update(ProgressUpdate::CaseFailed { index, message });
        self.send_progress_update();
    }

    /// Complete tracking.
    pub fn complete(&self) {
        self.send_update(ProgressUpdate::SweepCompleted {
            total_duration_ms: self.elapsed_ms(),
            completed: self.completed_cases.load(Ordering::Relaxed) as usize,
            failed: self.failed_cases.load(Ordering::Relaxed) as usize,
        });
    }

    /// Get current progress percentage.
    pub fn progress_percent(&self) -> f32 {
        if self.total_cases == 0 {
            return 100.0;
        }
        let done = self.completed_cases.load(Ordering::Relaxed) + self.failed_cases.load(Ordering::Relaxed);
        (done as f32 / self.total_cases as f32) * 100.0
    }

    /// Estimate remaining time in milliseconds from completed cases.
    pub fn estimated_remaining_ms(&self) -> Option<u64> {
        let times = self.case_times.lock();
        if times.is_empty() {
            return None;
        }
        let avg_time = times.iter().sum::<u64>() / times.len() as u64;
        let done = (self.completed_cases.load(Ordering::Relaxed) + self.failed_cases.load(Ordering::Relaxed)) as usize;
        let remaining = self.total_cases.saturating_sub(done);
        Some(avg_time * remaining as u64)
    }

    fn elapsed_ms(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_millis() as u64).unwrap_or(0)
    }

    fn send_update(&self, update: ProgressUpdate) {
        if let Some(ref callback) = self.callback {
            callback(update);
        }
    }

    fn send_progress_update(&self) {
        self.send_update(ProgressUpdate::Progress {
            percent: self.progress_percent(),
            elapsed_ms: self.elapsed_ms(),
            estimated_remaining_ms: self.estimated_remaining_ms(),
        });
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_calculation() {
        let tracker = ProgressTracker::new(4);
        assert_eq!(tracker.progress_percent(), 0.0);
        tracker.case_completed(0, 1.0, 10);
        tracker.case_failed(1, "boom".to_string());
        assert_eq!(tracker.progress_percent(), 50.0);
        assert_eq!(tracker.estimated_remaining_ms(), Some(20));
    }

    #[test]
    fn test_empty_sweep_is_complete() {
        assert_eq!(ProgressTracker::default().progress_percent(), 100.0);
    }

    #[test]
    fn test_callback_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Box::new(move |update| sink.lock().push(update));
        let mut tracker = ProgressTracker::new(1).with_callback(Some(Arc::new(callback)));
        tracker.start();
        tracker.case_started(0, "case".to_string());
        tracker.run_completed(0, 0, 2.5);
        tracker.case_completed(0, 2.5, 3);
        tracker.complete();

        let seen = seen.lock();
        assert_eq!(seen.len(), 5);
        assert!(matches!(seen[0], ProgressUpdate::CaseStarted { total: 1, .. }));
        assert!(matches!(seen[3], ProgressUpdate::Progress { .. }));
        assert!(matches!(seen[4], ProgressUpdate::SweepCompleted { completed: 1, failed: 0, .. }));
    }
}
