//! Single-stream offset coordinator
//!
//! Partitions one paginated remote stream into claimable `(offset, limit)`
//! ranges. The coordinator has no knowledge of the total dataset size; it
//! hands out strictly increasing offsets and relies on callers to observe a
//! short or empty page and signal completion.

use std::sync::Mutex;
use tracing::trace;

/// An `(offset, limit)` range claimed by exactly one worker, never reissued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetClaim {
    /// Starting offset of the page
    pub offset: u64,
    /// Page size (always equal to the coordinator's stride)
    pub limit: u64,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    current_offset: u64,
    workers_done: usize,
    total_workers: usize,
    total_claimed: u64,
}

/// Coordinates offset claiming for a single paginated stream.
///
/// The critical section is O(1) arithmetic under a single lock; it never
/// performs I/O, so contention stays negligible even with 50 workers.
#[derive(Debug)]
pub struct OffsetCoordinator {
    state: Mutex<CoordinatorState>,
    stride: u64,
}

impl OffsetCoordinator {
    /// Create a coordinator handing out ranges of `stride` items.
    pub fn new(stride: u64) -> Self {
        Self {
            state: Mutex::new(CoordinatorState::default()),
            stride,
        }
    }

    /// Declare how many workers will participate in this run. Must be called
    /// once before workers start claiming.
    pub fn set_total_workers(&self, total: usize) {
        let mut state = self.state.lock().unwrap();
        state.total_workers = total;
    }

    /// Atomically claim the next `(offset, limit)` range.
    ///
    /// Offsets advance strictly by `stride` per claim, so concurrent callers
    /// receive non-overlapping, gap-free ranges.
    pub fn claim_range(&self) -> OffsetClaim {
        let mut state = self.state.lock().unwrap();
        let offset = state.current_offset;
        state.current_offset += self.stride;
        state.total_claimed += 1;
        trace!(offset, stride = self.stride, "offset range claimed");
        OffsetClaim {
            offset,
            limit: self.stride,
        }
    }

    /// Record that one worker has observed end-of-data.
    pub fn mark_worker_complete(&self) {
        let mut state = self.state.lock().unwrap();
        state.workers_done += 1;
        trace!(
            workers_done = state.workers_done,
            total_workers = state.total_workers,
            "worker completed"
        );
    }

    /// Whether every worker has signalled completion. Vacuously true when no
    /// workers were registered.
    pub fn all_workers_done(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.workers_done >= state.total_workers
    }

    /// Total number of ranges handed out so far.
    pub fn total_claimed(&self) -> u64 {
        self.state.lock().unwrap().total_claimed
    }
}
