//! Parallel extraction engine
//!
//! This module provides the coordination core of a backup run:
//!
//! 1. **Range Claiming**: Workers pull non-overlapping `(offset, limit)`
//!    ranges from an [`coordinator::OffsetCoordinator`] (single stream) or a
//!    [`folders::MultiFolderOffsetCoordinator`] (one partition per folder).
//! 2. **Rate Limiting**: Every outbound API call is gated by an
//!    [`rate_limit::AdaptiveRateLimiter`] shared across all workers.
//! 3. **Worker Loop**: [`orchestrator::ParallelOrchestrator`] ties claiming,
//!    fetching, and persistence together and detects end-of-data per worker.
//! 4. **Metrics**: [`metrics::ThreadSafeMetrics`] aggregates throughput and
//!    error counts across workers for live progress and the final summary.
//! 5. **Work Queue**: [`queue::WorkQueue`] is the push-style alternative to
//!    pull-style claiming, used by the batch pipeline.
//!
//! Termination is entirely data-driven: the coordinators have no knowledge of
//! the total dataset size, so each worker independently observes a short or
//! empty page and signals completion.

pub mod config;
pub mod coordinator;
pub mod folders;
pub mod metrics;
pub mod orchestrator;
pub mod queue;
pub mod rate_limit;

pub use config::ExtractConfig;
pub use coordinator::{OffsetClaim, OffsetCoordinator};
pub use folders::{FolderClaim, FolderStats, MultiFolderOffsetCoordinator};
pub use metrics::{MetricsSnapshot, ThreadSafeMetrics};
pub use orchestrator::{BackupRequest, ExtractReport, ParallelOrchestrator};
pub use queue::{QueueError, WorkItem, WorkQueue};
pub use rate_limit::{AdaptiveRateLimiter, RateLimiterState, RateLimiterStats};

use crate::client::ApiError;
use crate::storage::StorageError;

/// Extraction engine errors
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Invalid extraction configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// API error outside the worker loop (e.g. folder discovery)
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// Storage error outside the worker loop (e.g. opening the store)
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Work queue error
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}
