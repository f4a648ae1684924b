//! Integration tests for the queued producer/consumer pipeline

use bivault::extract::{BackupRequest, ExtractConfig, ParallelOrchestrator};
use bivault::ContentType;

use super::stubs::{MemorySink, StubExtractor};

fn test_config(workers: usize) -> ExtractConfig {
    ExtractConfig {
        workers,
        stride: 100,
        requests_per_minute: 100_000,
        requests_per_second: 10_000,
        adaptive_rate_limiting: true,
    }
}

#[test]
fn test_push_pipeline_drains_full_dataset() {
    let extractor = StubExtractor::with_items(ContentType::Dashboards, 350);
    let sink = MemorySink::new();
    let orchestrator =
        ParallelOrchestrator::new(&extractor, &sink, test_config(3)).unwrap();

    let report = orchestrator
        .run_push(&BackupRequest::new(ContentType::Dashboards))
        .unwrap();

    assert_eq!(report.items_processed, 350);
    assert_eq!(sink.saved_ids().len(), 350);
    assert_eq!(report.snapshot.batches_completed, 4);
    assert_eq!(report.snapshot.errors, 0);
    assert_eq!(report.items_by_worker.len(), 3);
    assert_eq!(report.items_by_worker.iter().sum::<u64>(), 350);

    // The producer paginates sequentially; a short page ends production.
    let offsets: Vec<u64> = extractor.fetches().iter().map(|f| f.1).collect();
    assert_eq!(offsets, vec![0, 100, 200, 300]);
}

#[test]
fn test_push_pipeline_producer_retries_rate_limited_page() {
    let extractor =
        StubExtractor::with_items(ContentType::Charts, 250).rate_limit_once_at(100);
    let sink = MemorySink::new();
    let orchestrator =
        ParallelOrchestrator::new(&extractor, &sink, test_config(2)).unwrap();

    let report = orchestrator
        .run_push(&BackupRequest::new(ContentType::Charts))
        .unwrap();

    // Unlike claim-based workers, the single producer re-fetches the same
    // offset after a 429, so no data is lost.
    assert_eq!(report.items_processed, 250);
    assert_eq!(report.snapshot.errors, 0);

    let offsets: Vec<u64> = extractor.fetches().iter().map(|f| f.1).collect();
    assert_eq!(offsets, vec![0, 100, 100, 200]);
}

#[test]
fn test_push_pipeline_stops_on_fetch_error() {
    let extractor =
        StubExtractor::with_items(ContentType::Datasets, 350).fail_once_at(200);
    let sink = MemorySink::new();
    let orchestrator =
        ParallelOrchestrator::new(&extractor, &sink, test_config(2)).unwrap();

    let report = orchestrator
        .run_push(&BackupRequest::new(ContentType::Datasets))
        .unwrap();

    // Production halts at the failed page; earlier batches still land.
    assert_eq!(report.items_processed, 200);
    assert_eq!(report.snapshot.errors, 1);
}

#[test]
fn test_push_pipeline_survives_all_writers_failing() {
    let extractor = StubExtractor::with_items(ContentType::Dashboards, 800);
    let sink = MemorySink::new().failing_writers(2);
    let orchestrator =
        ParallelOrchestrator::new(&extractor, &sink, test_config(2)).unwrap();

    let report = orchestrator
        .run_push(&BackupRequest::new(ContentType::Dashboards))
        .unwrap();

    // With every consumer dead before the first batch, the dataset is larger
    // than the bounded queue; the run still ends because dead consumers keep
    // draining until their stop signal arrives.
    assert_eq!(report.items_processed, 0);
    assert_eq!(report.snapshot.errors, 2);
    assert!(sink.saved().is_empty());
}

#[test]
fn test_push_pipeline_fatal_save_unblocks_producer() {
    let extractor = StubExtractor::with_items(ContentType::Charts, 800);
    let sink = MemorySink::new().fatal_id("item-0");
    let orchestrator =
        ParallelOrchestrator::new(&extractor, &sink, test_config(1)).unwrap();

    let report = orchestrator
        .run_push(&BackupRequest::new(ContentType::Charts))
        .unwrap();

    // The lone consumer dies on the very first record but discards the rest
    // of the production instead of leaving the producer blocked on a full
    // queue.
    assert_eq!(report.items_processed, 0);
    assert_eq!(report.snapshot.errors, 1);
    assert_eq!(report.items_by_worker, vec![0]);
}

#[test]
fn test_push_pipeline_empty_dataset() {
    let extractor = StubExtractor::with_items(ContentType::Users, 0);
    let sink = MemorySink::new();
    let orchestrator =
        ParallelOrchestrator::new(&extractor, &sink, test_config(2)).unwrap();

    let report = orchestrator
        .run_push(&BackupRequest::new(ContentType::Users))
        .unwrap();

    assert_eq!(report.items_processed, 0);
    assert_eq!(report.snapshot.batches_completed, 0);
}
