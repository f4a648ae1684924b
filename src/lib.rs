//! # bivault
//!
//! A library and CLI for backing up content from a hosted BI platform's REST
//! API into a local SQLite database.
//!
//! ## Features
//!
//! - **Parallel Extraction**: A bounded pool of worker threads cooperatively
//!   partitions the remote paginated dataset into non-overlapping offset
//!   ranges, so no page is fetched twice and none is skipped.
//! - **Per-Folder Partitioning**: Folder-scoped extraction round-robins
//!   workers fairly across folders, each with its own offset counter.
//! - **Adaptive Rate Limiting**: Sliding-window admission control plus a
//!   multiplicative backoff state machine driven by HTTP 429 responses.
//! - **Crash-Safe Persistence**: Every item is committed individually as an
//!   idempotent upsert, so an interrupted run can simply be re-run.
//! - **Type-Safe**: Strong typing with validation for records and queries.
//!
//! ## Architecture
//!
//! The library is organized into several core modules:
//!
//! - [`client`] - REST extraction client for the remote BI platform
//! - [`extract`] - Parallel extraction engine (coordinators, rate limiter,
//!   metrics, work queue, orchestrator)
//! - [`storage`] - SQLite content repository with per-worker connections
//! - [`cli`] - CLI command implementations
//!
//! ## Quick Start
//!
//! ```no_run
//! use bivault::client::RestClient;
//! use bivault::extract::{BackupRequest, ExtractConfig, ParallelOrchestrator};
//! use bivault::storage::SqliteStore;
//! use bivault::ContentType;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RestClient::new("https://bi.example.com", "api-token")?;
//! let store = SqliteStore::open("./backup.db")?;
//!
//! let orchestrator =
//!     ParallelOrchestrator::new(&client, &store, ExtractConfig::default())?;
//! let report = orchestrator.run(&BackupRequest::new(ContentType::Dashboards))?;
//! println!("{} items backed up", report.items_processed);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// REST extraction client
pub mod client;

/// Parallel extraction engine
pub mod extract;

/// SQLite content repository
pub mod storage;

/// Kinds of content the remote platform exposes for backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContentType {
    /// Dashboard definitions
    #[serde(rename = "dashboards")]
    Dashboards,
    /// Saved charts / visualizations
    #[serde(rename = "charts")]
    Charts,
    /// Dataset / model definitions
    #[serde(rename = "datasets")]
    Datasets,
    /// Folder metadata
    #[serde(rename = "folders")]
    Folders,
    /// User accounts
    #[serde(rename = "users")]
    Users,
}

impl ContentType {
    /// All content types in backup order.
    pub const ALL: [ContentType; 5] = [
        ContentType::Folders,
        ContentType::Users,
        ContentType::Datasets,
        ContentType::Charts,
        ContentType::Dashboards,
    ];

    /// API endpoint path segment for this content type.
    pub fn endpoint(&self) -> &'static str {
        match self {
            ContentType::Dashboards => "dashboards",
            ContentType::Charts => "charts",
            ContentType::Datasets => "datasets",
            ContentType::Folders => "folders",
            ContentType::Users => "users",
        }
    }

    /// Whether this content type lives inside folders and therefore supports
    /// folder-scoped extraction.
    pub fn is_folder_scoped(&self) -> bool {
        matches!(
            self,
            ContentType::Dashboards | ContentType::Charts | ContentType::Datasets
        )
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dashboards" => Ok(ContentType::Dashboards),
            "charts" => Ok(ContentType::Charts),
            "datasets" => Ok(ContentType::Datasets),
            "folders" => Ok(ContentType::Folders),
            "users" => Ok(ContentType::Users),
            _ => Err(format!("Invalid content type: {s}")),
        }
    }
}

/// One logical piece of remote content, as fetched from the API.
///
/// Identity is `(content_type, id)`; persistence is an idempotent upsert on
/// that key, which is what makes re-fetching after an interrupted run safe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentRecord {
    /// Remote identifier, unique within its content type
    pub id: String,
    /// Content type this record belongs to
    pub content_type: ContentType,
    /// Human-readable name
    pub name: String,
    /// Containing folder, if the content type is folder-scoped
    pub folder_id: Option<String>,
    /// Last modification time reported by the platform
    pub updated_at: Option<DateTime<Utc>>,
    /// Full raw API payload for lossless restore
    pub payload: serde_json::Value,
}

impl ContentRecord {
    /// Validate record integrity before persistence.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("Content id cannot be empty".to_string());
        }

        if self.name.is_empty() {
            return Err(format!("Content name cannot be empty (id: {})", self.id));
        }

        Ok(())
    }
}
