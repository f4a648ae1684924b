//! Integration tests for the SQLite sink behind a full extraction run

use bivault::extract::{BackupRequest, ExtractConfig, ParallelOrchestrator};
use bivault::storage::SqliteStore;
use bivault::ContentType;

use super::stubs::StubExtractor;

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
fn test_extraction_persists_to_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("content.db")).unwrap();
    let extractor = StubExtractor::with_items(ContentType::Dashboards, 350);
    let orchestrator =
        ParallelOrchestrator::new(&extractor, &store, test_config(4)).unwrap();

    let report = orchestrator
        .run(&BackupRequest::new(ContentType::Dashboards))
        .unwrap();

    assert_eq!(report.items_processed, 350);
    let counts = store.count_by_type().unwrap();
    assert_eq!(counts.get("dashboards"), Some(&350));
}

#[test]
fn test_rerun_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("content.db");
    let store = SqliteStore::open(&db_path).unwrap();
    let extractor = StubExtractor::with_items(ContentType::Charts, 150);

    for _ in 0..2 {
        let orchestrator =
            ParallelOrchestrator::new(&extractor, &store, test_config(2)).unwrap();
        orchestrator
            .run(&BackupRequest::new(ContentType::Charts))
            .unwrap();
    }

    // Upsert keys keep the second run from duplicating rows.
    let counts = store.count_by_type().unwrap();
    assert_eq!(counts.get("charts"), Some(&150));
}

#[test]
fn test_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("content.db");

    {
        let store = SqliteStore::open(&db_path).unwrap();
        let extractor = StubExtractor::with_items(ContentType::Users, 40);
        let orchestrator =
            ParallelOrchestrator::new(&extractor, &store, test_config(2)).unwrap();
        orchestrator
            .run(&BackupRequest::new(ContentType::Users))
            .unwrap();
    }

    let reopened = SqliteStore::open(&db_path).unwrap();
    let counts = reopened.count_by_type().unwrap();
    assert_eq!(counts.get("users"), Some(&40));

    let items = reopened.list_content("users", 50).unwrap();
    assert_eq!(items.len(), 40);
}

#[test]
fn test_mixed_types_kept_separate() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("content.db")).unwrap();

    for (content_type, count) in [
        (ContentType::Dashboards, 120),
        (ContentType::Datasets, 30),
    ] {
        let extractor = StubExtractor::with_items(content_type, count);
        let orchestrator =
            ParallelOrchestrator::new(&extractor, &store, test_config(2)).unwrap();
        orchestrator.run(&BackupRequest::new(content_type)).unwrap();
    }

    let counts = store.count_by_type().unwrap();
    assert_eq!(counts.get("dashboards"), Some(&120));
    assert_eq!(counts.get("datasets"), Some(&30));
}
