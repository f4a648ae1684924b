//! Shared stub extractor and in-memory sink for engine tests

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use bivault::client::{ApiError, ApiResult, ContentExtractor, RangeQuery};
use bivault::storage::{ContentSink, ContentWriter, StorageError, StorageResult};
use bivault::{ContentRecord, ContentType};

/// Build a synthetic record for the given folder and index.
pub fn record(content_type: ContentType, folder: Option<&str>, index: usize) -> ContentRecord {
    let id = match folder {
        Some(folder) => format!("{folder}-{index}"),
        None => format!("item-{index}"),
    };
    ContentRecord {
        id: id.clone(),
        content_type,
        name: format!("Item {index}"),
        folder_id: folder.map(str::to_string),
        updated_at: None,
        payload: serde_json::json!({"id": id}),
    }
}

/// In-memory extractor serving fixed datasets, with per-offset failure
/// injection and a log of every fetch it saw.
pub struct StubExtractor {
    content_type: ContentType,
    items: BTreeMap<Option<String>, Vec<ContentRecord>>,
    fetch_log: Mutex<Vec<(Option<String>, u64, u64)>>,
    fail_once_at: Mutex<HashSet<u64>>,
    rate_limit_once_at: Mutex<HashSet<u64>>,
    report_total: bool,
}

impl StubExtractor {
    /// Single-stream dataset of `count` items.
    pub fn with_items(content_type: ContentType, count: usize) -> Self {
        let items = (0..count)
            .map(|i| record(content_type, None, i))
            .collect();
        Self {
            content_type,
            items: BTreeMap::from([(None, items)]),
            fetch_log: Mutex::new(Vec::new()),
            fail_once_at: Mutex::new(HashSet::new()),
            rate_limit_once_at: Mutex::new(HashSet::new()),
            report_total: false,
        }
    }

    /// Folder-partitioned dataset; one entry per folder with its item count.
    pub fn with_folders(content_type: ContentType, folders: &[(&str, usize)]) -> Self {
        let items = folders
            .iter()
            .map(|(folder, count)| {
                let records = (0..*count)
                    .map(|i| record(content_type, Some(folder), i))
                    .collect();
                (Some(folder.to_string()), records)
            })
            .collect();
        Self {
            content_type,
            items,
            fetch_log: Mutex::new(Vec::new()),
            fail_once_at: Mutex::new(HashSet::new()),
            rate_limit_once_at: Mutex::new(HashSet::new()),
            report_total: false,
        }
    }

    /// Expose the dataset size through `total_count()`.
    pub fn reporting_total(mut self) -> Self {
        self.report_total = true;
        self
    }

    /// Fail the first fetch at `offset` with a generic API error.
    pub fn fail_once_at(self, offset: u64) -> Self {
        self.fail_once_at.lock().unwrap().insert(offset);
        self
    }

    /// Answer the first fetch at `offset` with HTTP 429.
    pub fn rate_limit_once_at(self, offset: u64) -> Self {
        self.rate_limit_once_at.lock().unwrap().insert(offset);
        self
    }

    /// Every `(folder, offset, limit)` fetch observed, in arrival order.
    pub fn fetches(&self) -> Vec<(Option<String>, u64, u64)> {
        self.fetch_log.lock().unwrap().clone()
    }
}

impl ContentExtractor for StubExtractor {
    fn extract_range(&self, query: &RangeQuery) -> ApiResult<Vec<ContentRecord>> {
        self.fetch_log.lock().unwrap().push((
            query.folder_id.clone(),
            query.offset,
            query.limit,
        ));

        if self.rate_limit_once_at.lock().unwrap().remove(&query.offset) {
            return Err(ApiError::RateLimited);
        }
        if self.fail_once_at.lock().unwrap().remove(&query.offset) {
            return Err(ApiError::Api(format!("injected failure at {}", query.offset)));
        }

        let items = self
            .items
            .get(&query.folder_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let start = (query.offset as usize).min(items.len());
        let end = (start + query.limit as usize).min(items.len());
        Ok(items[start..end].to_vec())
    }

    fn list_folders(&self) -> ApiResult<Vec<String>> {
        Ok(self.items.keys().flatten().cloned().collect())
    }

    fn total_count(&self, _content_type: ContentType) -> ApiResult<Option<u64>> {
        if self.report_total {
            let total: usize = self.items.values().map(Vec::len).sum();
            Ok(Some(total as u64))
        } else {
            Ok(None)
        }
    }
}

/// Thread-safe in-memory sink recording every saved record.
#[derive(Clone, Default)]
pub struct MemorySink {
    saved: Arc<Mutex<Vec<ContentRecord>>>,
    fail_ids: Arc<Mutex<HashSet<String>>>,
    fatal_ids: Arc<Mutex<HashSet<String>>>,
    failing_writers: Arc<Mutex<usize>>,
    writers_opened: Arc<Mutex<usize>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject saves of the given record id with a non-fatal error.
    pub fn failing_id(self, id: &str) -> Self {
        self.fail_ids.lock().unwrap().insert(id.to_string());
        self
    }

    /// Reject saves of the given record id with a fatal busy error.
    pub fn fatal_id(self, id: &str) -> Self {
        self.fatal_ids.lock().unwrap().insert(id.to_string());
        self
    }

    /// Fail the first `count` calls to `open_writer`.
    pub fn failing_writers(self, count: usize) -> Self {
        *self.failing_writers.lock().unwrap() = count;
        self
    }

    pub fn saved(&self) -> Vec<ContentRecord> {
        self.saved.lock().unwrap().clone()
    }

    pub fn saved_ids(&self) -> HashSet<String> {
        self.saved
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn writers_opened(&self) -> usize {
        *self.writers_opened.lock().unwrap()
    }
}

impl ContentSink for MemorySink {
    fn open_writer(&self) -> StorageResult<Box<dyn ContentWriter>> {
        {
            let mut remaining = self.failing_writers.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StorageError::Io("injected open failure".to_string()));
            }
        }
        *self.writers_opened.lock().unwrap() += 1;
        Ok(Box::new(MemoryWriter {
            sink: self.clone(),
        }))
    }
}

struct MemoryWriter {
    sink: MemorySink,
}

impl ContentWriter for MemoryWriter {
    fn save_content(&mut self, record: &ContentRecord) -> StorageResult<()> {
        if self.sink.fatal_ids.lock().unwrap().contains(&record.id) {
            return Err(StorageError::Busy {
                attempts: 5,
                message: format!("injected lock contention on {}", record.id),
            });
        }
        if self.sink.fail_ids.lock().unwrap().contains(&record.id) {
            return Err(StorageError::Database(format!(
                "injected save failure for {}",
                record.id
            )));
        }
        self.sink.saved.lock().unwrap().push(record.clone());
        Ok(())
    }
}
