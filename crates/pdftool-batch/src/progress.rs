//! Thread-safe completion statistics for a batch of known size.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Point-in-time view of a batch. Times are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub processed: usize,
    pub total: usize,
    pub failed: usize,
    pub success: usize,
    pub progress_percent: f64,
    pub current_file: String,
    pub elapsed_time: f64,
    pub estimated_remaining: f64,
    pub is_complete: bool,
}

#[derive(Debug, Default)]
struct Counters {
    processed: usize,
    failed: usize,
    current_file: String,
}

/// Counts processed and failed files under a single mutex.
///
/// A failed file still counts as processed, so `processed` reaches
/// `total` once every file has an outcome.
#[derive(Debug)]
pub struct ProgressTracker {
    total: usize,
    started: Instant,
    counters: Mutex<Counters>,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            started: Instant::now(),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Record one finished file. `current_file` keeps only the file name.
    pub fn update_progress(&self, file: &Path, success: bool) {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());

        let mut counters = self.lock();
        if counters.processed < self.total {
            counters.processed += 1;
            if !success {
                counters.failed += 1;
            }
        }
        counters.current_file = name;
    }

    pub fn get_progress(&self) -> ProgressSnapshot {
        self.progress_at(Instant::now())
    }

    /// Snapshot with elapsed time measured up to `now`.
    pub fn progress_at(&self, now: Instant) -> ProgressSnapshot {
        let counters = self.lock();
        let processed = counters.processed;
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();

        let progress_percent = if self.total == 0 {
            0.0
        } else {
            processed as f64 / self.total as f64 * 100.0
        };
        let estimated_remaining = if processed == 0 {
            0.0
        } else {
            elapsed / processed as f64 * (self.total - processed) as f64
        };

        ProgressSnapshot {
            processed,
            total: self.total,
            failed: counters.failed,
            success: processed - counters.failed,
            progress_percent,
            current_file: counters.current_file.clone(),
            elapsed_time: elapsed,
            estimated_remaining,
            is_complete: processed >= self.total,
        }
    }

    /// When the tracker was created.
    pub fn started_at(&self) -> Instant {
        self.started
    }

    // Counters stay consistent even if a holder panicked: every update is a
    // single increment.
    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
