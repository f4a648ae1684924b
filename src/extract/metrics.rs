//! Cross-worker metrics aggregation
//!
//! All mutators take a single coarse lock, touch plain counters, and release
//! without performing I/O, so workers can report progress from hot loops.
//! [`ThreadSafeMetrics::snapshot`] produces a fully independent copy with
//! derived throughput and progress fields for the CLI and final summary.

use crate::ContentType;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Default)]
struct MetricsState {
    total: u64,
    by_type: HashMap<ContentType, u64>,
    total_by_type: HashMap<ContentType, u64>,
    batches_completed: u64,
    errors: u64,
    worker_errors: HashMap<usize, Vec<String>>,
}

/// Point-in-time, deep-copied view of a run's metrics.
///
/// `sum(by_type.values()) == total` always holds, and every
/// `progress_by_type` value lies in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Total items persisted across all types
    pub total: u64,
    /// Items persisted per content type
    pub by_type: BTreeMap<ContentType, u64>,
    /// Expected totals per content type, where registered
    pub total_by_type: BTreeMap<ContentType, u64>,
    /// Completion percentage per content type with a registered total
    pub progress_by_type: BTreeMap<ContentType, f64>,
    /// Pages fully processed
    pub batches_completed: u64,
    /// Total errors across fetch and persistence
    pub errors: u64,
    /// Wall-clock seconds since the metrics were created
    pub duration_seconds: f64,
    /// Items persisted per second (0 when duration is 0)
    pub items_per_second: f64,
    /// Error messages attributed per worker id
    pub worker_errors: BTreeMap<usize, Vec<String>>,
}

/// Lock-protected counters aggregating throughput and error data across all
/// workers of a run.
#[derive(Debug)]
pub struct ThreadSafeMetrics {
    state: Mutex<MetricsState>,
    start_time: Instant,
}

impl Default for ThreadSafeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadSafeMetrics {
    /// Create a metrics aggregator; the run clock starts now.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MetricsState::default()),
            start_time: Instant::now(),
        }
    }

    /// Record `count` successfully persisted items of `content_type`.
    pub fn increment_processed(&self, content_type: ContentType, count: u64) {
        let mut state = self.state.lock().unwrap();
        state.total += count;
        *state.by_type.entry(content_type).or_insert(0) += count;
    }

    /// Record `count` fully processed pages.
    pub fn increment_batches(&self, count: u64) {
        self.state.lock().unwrap().batches_completed += count;
    }

    /// Register the expected total for a content type, enabling
    /// `progress_by_type` in snapshots.
    pub fn set_total(&self, content_type: ContentType, total: u64) {
        let mut state = self.state.lock().unwrap();
        state.total_by_type.insert(content_type, total);
    }

    /// Record an error attributed to `worker_id`.
    pub fn record_error(&self, worker_id: usize, message: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.errors += 1;
        state
            .worker_errors
            .entry(worker_id)
            .or_default()
            .push(message.into());
    }

    /// Compute a fully independent snapshot under the same lock.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.lock().unwrap();

        let duration_seconds = self.start_time.elapsed().as_secs_f64();
        let items_per_second = if duration_seconds > 0.0 {
            state.total as f64 / duration_seconds
        } else {
            0.0
        };

        let progress_by_type = state
            .total_by_type
            .iter()
            .map(|(&content_type, &total)| {
                let processed = state.by_type.get(&content_type).copied().unwrap_or(0);
                let percent = if total == 0 {
                    100.0
                } else {
                    (processed as f64 / total as f64 * 100.0).min(100.0)
                };
                (content_type, percent)
            })
            .collect();

        MetricsSnapshot {
            total: state.total,
            by_type: state.by_type.iter().map(|(&k, &v)| (k, v)).collect(),
            total_by_type: state.total_by_type.iter().map(|(&k, &v)| (k, v)).collect(),
            progress_by_type,
            batches_completed: state.batches_completed,
            errors: state.errors,
            duration_seconds,
            items_per_second,
            worker_errors: state
                .worker_errors
                .iter()
                .map(|(&k, v)| (k, v.clone()))
                .collect(),
        }
    }
}
