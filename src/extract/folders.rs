//! Multi-folder offset coordinator
//!
//! Generalizes [`crate::extract::coordinator::OffsetCoordinator`] to K
//! independent partitions, one per remote folder. A rotating cursor
//! round-robins claims across folders so no folder starves while workers are
//! still retrieving data elsewhere, and per-folder offsets let worker A
//! progress folder 1 without blocking worker B on folder 2.

use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::{trace, warn};

/// A `(folder, offset, limit)` range claimed by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderClaim {
    /// Folder key this range belongs to
    pub folder: String,
    /// Starting offset within the folder's stream
    pub offset: u64,
    /// Page size (the coordinator's stride)
    pub limit: u64,
}

/// Point-in-time view of one folder's extraction progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct FolderStats {
    /// Next offset that would be claimed
    pub current_offset: u64,
    /// Workers that have observed end-of-data for this folder
    pub workers_done: usize,
    /// Ranges handed out for this folder
    pub total_claimed: u64,
}

#[derive(Debug, Default)]
struct FolderRange {
    current_offset: u64,
    workers_done: usize,
    total_claimed: u64,
}

#[derive(Debug)]
struct MultiState {
    keys: Vec<String>,
    ranges: Vec<FolderRange>,
    cursor: usize,
    total_workers: usize,
}

/// Coordinates offset claiming across independent per-folder streams.
#[derive(Debug)]
pub struct MultiFolderOffsetCoordinator {
    state: Mutex<MultiState>,
    stride: u64,
}

impl MultiFolderOffsetCoordinator {
    /// Create a coordinator over an ordered list of folder keys.
    pub fn new(folders: Vec<String>, stride: u64) -> Self {
        let ranges = folders.iter().map(|_| FolderRange::default()).collect();
        // Cursor starts on the last key so the first advance lands on keys[0].
        let cursor = folders.len().saturating_sub(1);
        Self {
            state: Mutex::new(MultiState {
                keys: folders,
                ranges,
                cursor,
                total_workers: 0,
            }),
            stride,
        }
    }

    /// Declare how many workers will participate. Must be called once before
    /// workers start claiming.
    pub fn set_total_workers(&self, total: usize) {
        let mut state = self.state.lock().unwrap();
        state.total_workers = total;
    }

    /// Claim the next range, rotating fairly across non-exhausted folders.
    ///
    /// The cursor advances by one position before exhaustion is evaluated, so
    /// the rotation always progresses even past skipped keys. At most
    /// `len(keys)` candidates are examined per call; returns `None` iff every
    /// folder is exhausted.
    pub fn claim_range(&self) -> Option<FolderClaim> {
        let mut state = self.state.lock().unwrap();
        let count = state.keys.len();
        if count == 0 {
            return None;
        }

        for _ in 0..count {
            state.cursor = (state.cursor + 1) % count;
            let index = state.cursor;
            let total_workers = state.total_workers;

            let range = &mut state.ranges[index];
            if range.workers_done >= total_workers {
                continue;
            }

            let offset = range.current_offset;
            range.current_offset += self.stride;
            range.total_claimed += 1;
            let folder = state.keys[index].clone();
            trace!(folder = %folder, offset, "folder range claimed");
            return Some(FolderClaim {
                folder,
                offset,
                limit: self.stride,
            });
        }

        None
    }

    /// Record that one worker has observed end-of-data for `folder`.
    ///
    /// Once `workers_done` reaches the registered worker count, the folder is
    /// permanently unclaimable.
    pub fn mark_folder_complete(&self, folder: &str) {
        let mut state = self.state.lock().unwrap();
        match state.keys.iter().position(|key| key == folder) {
            Some(index) => {
                state.ranges[index].workers_done += 1;
                trace!(
                    folder = %folder,
                    workers_done = state.ranges[index].workers_done,
                    "folder completion signalled"
                );
            }
            None => warn!(folder = %folder, "completion signal for unknown folder"),
        }
    }

    /// Remove a worker that exited without finishing its sweep, lowering the
    /// completion threshold of every folder accordingly.
    ///
    /// Without this, a fatally-failed worker's missing `workers_done` marks
    /// would keep every folder claimable forever and the surviving workers
    /// would never observe [`claim_range`](Self::claim_range) returning
    /// `None`.
    pub fn deregister_worker(&self) {
        let mut state = self.state.lock().unwrap();
        state.total_workers = state.total_workers.saturating_sub(1);
        warn!(
            total_workers = state.total_workers,
            "worker deregistered before completing its sweep"
        );
    }

    /// Whether every folder is exhausted.
    pub fn all_folders_exhausted(&self) -> bool {
        let state = self.state.lock().unwrap();
        state
            .ranges
            .iter()
            .all(|range| range.workers_done >= state.total_workers)
    }

    /// Snapshot of per-folder progress for diagnostics.
    pub fn get_statistics(&self) -> BTreeMap<String, FolderStats> {
        let state = self.state.lock().unwrap();
        state
            .keys
            .iter()
            .zip(state.ranges.iter())
            .map(|(key, range)| {
                (
                    key.clone(),
                    FolderStats {
                        current_offset: range.current_offset,
                        workers_done: range.workers_done,
                        total_claimed: range.total_claimed,
                    },
                )
            })
            .collect()
    }
}
