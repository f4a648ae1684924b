//! Parallel extraction orchestrator
//!
//! Ties the coordination pieces together: workers claim non-overlapping
//! ranges, gate every fetch through the shared rate limiter, persist each
//! page through their own writer handle, and independently detect
//! end-of-data from a short or empty page. A failed fetch abandons its
//! range and moves on; the per-type upsert keys make any rare gap
//! self-healing on the next run.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::client::{ApiError, ContentExtractor, RangeQuery};
use crate::extract::coordinator::OffsetCoordinator;
use crate::extract::folders::{FolderStats, MultiFolderOffsetCoordinator};
use crate::extract::metrics::{MetricsSnapshot, ThreadSafeMetrics};
use crate::extract::queue::{WorkItem, WorkQueue};
use crate::extract::rate_limit::AdaptiveRateLimiter;
use crate::extract::{ExtractConfig, ExtractError};
use crate::storage::{ContentSink, ContentWriter};
use crate::ContentType;

/// Parameters of one backup run.
#[derive(Debug, Clone)]
pub struct BackupRequest {
    /// Content type to extract
    pub content_type: ContentType,
    /// Optional field projection forwarded to the API
    pub fields: Option<String>,
    /// Only fetch items modified after this instant
    pub updated_after: Option<DateTime<Utc>>,
}

impl BackupRequest {
    /// Request a full extraction of one content type.
    pub fn new(content_type: ContentType) -> Self {
        Self {
            content_type,
            fields: None,
            updated_after: None,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug)]
pub struct ExtractReport {
    /// Items persisted during this run
    pub items_processed: u64,
    /// Items persisted by each worker, indexed by worker id
    pub items_by_worker: Vec<u64>,
    /// Final metrics snapshot
    pub snapshot: MetricsSnapshot,
    /// Per-folder claim statistics (folder-partitioned runs only)
    pub folder_stats: Option<BTreeMap<String, FolderStats>>,
}

/// Drives a pool of worker threads through one extraction run.
///
/// The orchestrator owns the shared rate limiter and metrics; the caller
/// supplies the API client and the storage sink. Workers are plain OS
/// threads joined via [`std::thread::scope`], so a run blocks until every
/// worker has finished.
pub struct ParallelOrchestrator<'a> {
    extractor: &'a dyn ContentExtractor,
    sink: &'a dyn ContentSink,
    config: ExtractConfig,
    metrics: Arc<ThreadSafeMetrics>,
    limiter: Arc<AdaptiveRateLimiter>,
}

impl<'a> ParallelOrchestrator<'a> {
    /// Build an orchestrator, validating the configuration.
    pub fn new(
        extractor: &'a dyn ContentExtractor,
        sink: &'a dyn ContentSink,
        config: ExtractConfig,
    ) -> Result<Self, ExtractError> {
        config.validate().map_err(ExtractError::InvalidConfig)?;
        let limiter = Arc::new(AdaptiveRateLimiter::new(
            config.requests_per_minute,
            config.requests_per_second,
            config.adaptive_rate_limiting,
        ));
        Ok(Self {
            extractor,
            sink,
            config,
            metrics: Arc::new(ThreadSafeMetrics::new()),
            limiter,
        })
    }

    /// Live metrics, shared with the workers for progress reporting.
    pub fn metrics(&self) -> Arc<ThreadSafeMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Shared rate limiter, exposed for diagnostics.
    pub fn limiter(&self) -> Arc<AdaptiveRateLimiter> {
        Arc::clone(&self.limiter)
    }

    fn seed_total(&self, content_type: ContentType) {
        match self.extractor.total_count(content_type) {
            Ok(Some(total)) => self.metrics.set_total(content_type, total),
            Ok(None) => {}
            Err(e) => debug!("Total count unavailable for {}: {}", content_type, e),
        }
    }

    fn report(
        &self,
        items_by_worker: Vec<u64>,
        folder_stats: Option<BTreeMap<String, FolderStats>>,
    ) -> ExtractReport {
        let snapshot = self.metrics.snapshot();
        ExtractReport {
            items_processed: snapshot.total,
            items_by_worker,
            snapshot,
            folder_stats,
        }
    }

    /// Run a single-stream extraction: all workers claim offsets from one
    /// shared coordinator over the full listing.
    pub fn run(&self, request: &BackupRequest) -> Result<ExtractReport, ExtractError> {
        self.seed_total(request.content_type);

        let coordinator = OffsetCoordinator::new(self.config.stride);
        coordinator.set_total_workers(self.config.workers);
        info!(
            "Starting {} extraction with {} workers (stride {})",
            request.content_type, self.config.workers, self.config.stride
        );

        let items_by_worker = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..self.config.workers)
                .map(|worker_id| {
                    let coordinator = &coordinator;
                    scope.spawn(move || self.single_stream_worker(worker_id, coordinator, request))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or(0))
                .collect()
        });

        let report = self.report(items_by_worker, None);
        info!(
            "Finished {} extraction: {} items, {} errors",
            request.content_type, report.items_processed, report.snapshot.errors
        );
        Ok(report)
    }

    fn single_stream_worker(
        &self,
        worker_id: usize,
        coordinator: &OffsetCoordinator,
        request: &BackupRequest,
    ) -> u64 {
        let mut writer = match self.sink.open_writer() {
            Ok(writer) => writer,
            Err(e) => {
                self.metrics
                    .record_error(worker_id, format!("failed to open writer: {}", e));
                return 0;
            }
        };

        let mut items_processed = 0u64;
        loop {
            let claim = coordinator.claim_range();
            self.limiter.acquire();

            let mut query = RangeQuery::new(request.content_type, claim.offset, claim.limit);
            query.fields = request.fields.clone();
            query.updated_after = request.updated_after;

            let records = match self.extractor.extract_range(&query) {
                Ok(records) => {
                    self.limiter.on_success();
                    records
                }
                Err(ApiError::RateLimited) => {
                    self.limiter.on_429_detected();
                    debug!(
                        "Worker {} rate limited at offset {}, moving on",
                        worker_id, claim.offset
                    );
                    continue;
                }
                Err(e) => {
                    warn!(
                        "Worker {} fetch failed at offset {}: {}",
                        worker_id, claim.offset, e
                    );
                    self.metrics.record_error(worker_id, e.to_string());
                    continue;
                }
            };

            if records.is_empty() {
                debug!(
                    "Worker {} found end of data at offset {}",
                    worker_id, claim.offset
                );
                coordinator.mark_worker_complete();
                break;
            }

            let page_len = records.len() as u64;
            match self.persist_page(worker_id, writer.as_mut(), request.content_type, &records) {
                Some(saved) => items_processed += saved,
                None => return items_processed,
            }

            if page_len < claim.limit {
                debug!(
                    "Worker {} saw short page ({}/{}) at offset {}",
                    worker_id, page_len, claim.limit, claim.offset
                );
                coordinator.mark_worker_complete();
                break;
            }
        }

        debug!("Worker {} finished with {} items", worker_id, items_processed);
        items_processed
    }

    /// Run a folder-partitioned extraction: workers rotate across folders,
    /// each folder paginated independently.
    pub fn run_by_folder(&self, request: &BackupRequest) -> Result<ExtractReport, ExtractError> {
        if !request.content_type.is_folder_scoped() {
            return Err(ExtractError::InvalidConfig(format!(
                "{} listings are not folder-scoped",
                request.content_type
            )));
        }

        let folders = self.extractor.list_folders()?;
        if folders.is_empty() {
            info!("No folders visible, nothing to extract");
            return Ok(self.report(Vec::new(), Some(BTreeMap::new())));
        }
        self.seed_total(request.content_type);

        let coordinator = MultiFolderOffsetCoordinator::new(folders, self.config.stride);
        coordinator.set_total_workers(self.config.workers);
        info!(
            "Starting folder-partitioned {} extraction with {} workers",
            request.content_type, self.config.workers
        );

        let items_by_worker = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..self.config.workers)
                .map(|worker_id| {
                    let coordinator = &coordinator;
                    scope.spawn(move || self.folder_worker(worker_id, coordinator, request))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or(0))
                .collect()
        });

        let stats = coordinator.get_statistics();
        let report = self.report(items_by_worker, Some(stats));
        info!(
            "Finished folder-partitioned {} extraction: {} items, {} errors",
            request.content_type, report.items_processed, report.snapshot.errors
        );
        Ok(report)
    }

    fn folder_worker(
        &self,
        worker_id: usize,
        coordinator: &MultiFolderOffsetCoordinator,
        request: &BackupRequest,
    ) -> u64 {
        let mut writer = match self.sink.open_writer() {
            Ok(writer) => writer,
            Err(e) => {
                self.metrics
                    .record_error(worker_id, format!("failed to open writer: {}", e));
                // A worker that exits early can never mark folders complete,
                // so lower the completion threshold for the survivors.
                coordinator.deregister_worker();
                return 0;
            }
        };

        // Each worker signals a folder's end of data at most once, even if
        // it observes short pages in that folder repeatedly.
        let mut finished_folders: HashSet<String> = HashSet::new();
        let mut items_processed = 0u64;

        while let Some(claim) = coordinator.claim_range() {
            self.limiter.acquire();

            let mut query = RangeQuery::new(request.content_type, claim.offset, claim.limit)
                .in_folder(claim.folder.clone());
            query.fields = request.fields.clone();
            query.updated_after = request.updated_after;

            let records = match self.extractor.extract_range(&query) {
                Ok(records) => {
                    self.limiter.on_success();
                    records
                }
                Err(ApiError::RateLimited) => {
                    self.limiter.on_429_detected();
                    continue;
                }
                Err(e) => {
                    warn!(
                        "Worker {} fetch failed in folder {} at offset {}: {}",
                        worker_id, claim.folder, claim.offset, e
                    );
                    self.metrics.record_error(worker_id, e.to_string());
                    continue;
                }
            };

            let page_len = records.len() as u64;
            if !records.is_empty() {
                match self.persist_page(
                    worker_id,
                    writer.as_mut(),
                    request.content_type,
                    &records,
                ) {
                    Some(saved) => items_processed += saved,
                    None => {
                        coordinator.deregister_worker();
                        return items_processed;
                    }
                }
            }

            if page_len < claim.limit && finished_folders.insert(claim.folder.clone()) {
                debug!(
                    "Worker {} found end of folder {} at offset {}",
                    worker_id, claim.folder, claim.offset
                );
                coordinator.mark_folder_complete(&claim.folder);
            }
        }

        debug!("Worker {} finished with {} items", worker_id, items_processed);
        items_processed
    }

    /// Run a push-style extraction: a single producer paginates the listing
    /// into batches on a bounded queue and the worker pool drains it.
    pub fn run_push(&self, request: &BackupRequest) -> Result<ExtractReport, ExtractError> {
        self.seed_total(request.content_type);

        let queue = WorkQueue::new(self.config.workers * 2);
        info!(
            "Starting queued {} extraction with {} consumers",
            request.content_type, self.config.workers
        );

        let items_by_worker = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..self.config.workers)
                .map(|worker_id| {
                    let queue = &queue;
                    scope.spawn(move || self.queue_consumer(worker_id, queue, request.content_type))
                })
                .collect();

            self.queue_producer(&queue, request);
            if let Err(e) = queue.send_stop_signals(self.config.workers) {
                warn!("Failed to deliver stop signals: {}", e);
            }

            handles
                .into_iter()
                .map(|h| h.join().unwrap_or(0))
                .collect()
        });

        let report = self.report(items_by_worker, None);
        info!(
            "Finished queued {} extraction: {} items, {} errors",
            request.content_type, report.items_processed, report.snapshot.errors
        );
        Ok(report)
    }

    fn queue_producer(&self, queue: &WorkQueue, request: &BackupRequest) {
        let mut offset = 0u64;
        let mut batch_number = 0u64;

        loop {
            self.limiter.acquire();
            let mut query = RangeQuery::new(request.content_type, offset, self.config.stride);
            query.fields = request.fields.clone();
            query.updated_after = request.updated_after;

            let records = match self.extractor.extract_range(&query) {
                Ok(records) => {
                    self.limiter.on_success();
                    records
                }
                Err(ApiError::RateLimited) => {
                    // The producer owns sequential pagination, so it retries
                    // the same offset after backing off rather than dropping
                    // the page.
                    self.limiter.on_429_detected();
                    continue;
                }
                Err(e) => {
                    warn!("Producer fetch failed at offset {}: {}", offset, e);
                    self.metrics.record_error(0, e.to_string());
                    break;
                }
            };

            if records.is_empty() {
                break;
            }

            let page_len = records.len() as u64;
            let is_final = page_len < self.config.stride;
            match WorkItem::new(request.content_type, records, batch_number, is_final) {
                Ok(item) => {
                    if let Err(e) = queue.put_work(item) {
                        warn!("Producer failed to enqueue batch {}: {}", batch_number, e);
                        self.metrics.record_error(0, e.to_string());
                        break;
                    }
                }
                Err(e) => {
                    self.metrics.record_error(0, e.to_string());
                    break;
                }
            }

            batch_number += 1;
            if is_final {
                break;
            }
            offset += page_len;
        }
    }

    fn queue_consumer(&self, worker_id: usize, queue: &WorkQueue, content_type: ContentType) -> u64 {
        let mut writer = match self.sink.open_writer() {
            Ok(writer) => writer,
            Err(e) => {
                self.metrics
                    .record_error(worker_id, format!("failed to open writer: {}", e));
                self.drain_queue(worker_id, queue);
                return 0;
            }
        };

        let mut items_processed = 0u64;
        loop {
            match queue.get_work() {
                Ok(Some(item)) => {
                    match self.persist_page(worker_id, writer.as_mut(), content_type, &item.items)
                    {
                        Some(saved) => items_processed += saved,
                        None => {
                            self.drain_queue(worker_id, queue);
                            return items_processed;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    self.metrics.record_error(worker_id, e.to_string());
                    break;
                }
            }
        }

        debug!("Worker {} finished with {} items", worker_id, items_processed);
        items_processed
    }

    /// Discard queued batches until a stop signal arrives.
    ///
    /// A consumer that stops persisting must keep receiving, otherwise the
    /// producer can block forever on the bounded queue with nobody left to
    /// take its batches.
    fn drain_queue(&self, worker_id: usize, queue: &WorkQueue) {
        let mut discarded = 0u64;
        while let Ok(Some(item)) = queue.get_work() {
            discarded += item.items.len() as u64;
        }
        if discarded > 0 {
            warn!(
                "Worker {} discarded {} queued items after a fatal error",
                worker_id, discarded
            );
        }
    }

    /// Persist one page of records, skipping individual failures.
    ///
    /// Returns the number of records saved, or `None` when the writer hit a
    /// fatal storage error and the worker must stop without signalling
    /// completion.
    fn persist_page(
        &self,
        worker_id: usize,
        writer: &mut dyn ContentWriter,
        content_type: ContentType,
        records: &[crate::ContentRecord],
    ) -> Option<u64> {
        let mut saved = 0u64;
        for record in records {
            match writer.save_content(record) {
                Ok(()) => saved += 1,
                Err(e) if e.is_fatal() => {
                    warn!(
                        "Worker {} stopping on fatal storage error: {}",
                        worker_id, e
                    );
                    self.metrics.record_error(worker_id, e.to_string());
                    return None;
                }
                Err(e) => {
                    debug!(
                        "Worker {} skipping {} {}: {}",
                        worker_id, content_type, record.id, e
                    );
                    self.metrics.record_error(worker_id, e.to_string());
                }
            }
        }

        if saved > 0 {
            self.metrics.increment_processed(content_type, saved);
        }
        self.metrics.increment_batches(1);
        Some(saved)
    }
}
