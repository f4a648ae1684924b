//! REST API client implementations

use crate::{ContentRecord, ContentType};

pub mod http;

pub use http::RestClient;

/// API client errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(String),

    /// API returned an error payload
    #[error("API error: {0}")]
    Api(String),

    /// Response parse error
    #[error("parse error: {0}")]
    Parse(String),

    /// Server signalled rate limiting (HTTP 429)
    #[error("rate limited by server")]
    RateLimited,

    /// Authentication failed (HTTP 401/403)
    #[error("authentication failed: {0}")]
    Auth(String),
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// A single offset/limit page request against one content endpoint.
#[derive(Debug, Clone)]
pub struct RangeQuery {
    /// Content type to fetch
    pub content_type: ContentType,
    /// Starting offset within the listing
    pub offset: u64,
    /// Maximum number of items to return
    pub limit: u64,
    /// Restrict results to a single folder (folder-scoped types only)
    pub folder_id: Option<String>,
    /// Comma-separated field projection passed through to the API
    pub fields: Option<String>,
    /// Only return items modified after this instant
    pub updated_after: Option<chrono::DateTime<chrono::Utc>>,
}

impl RangeQuery {
    /// Build a query for one page of a content listing.
    pub fn new(content_type: ContentType, offset: u64, limit: u64) -> Self {
        Self {
            content_type,
            offset,
            limit,
            folder_id: None,
            fields: None,
            updated_after: None,
        }
    }

    /// Scope the query to a single folder.
    pub fn in_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }
}

/// Source of paginated content listings.
///
/// Implementations must be safe to call concurrently from multiple
/// worker threads.
pub trait ContentExtractor: Send + Sync {
    /// Fetch one page of content for the given range.
    ///
    /// An empty vector means the listing is exhausted at this offset.
    /// A vector shorter than `query.limit` means this is the final page.
    fn extract_range(&self, query: &RangeQuery) -> ApiResult<Vec<ContentRecord>>;

    /// List all folder identifiers visible to the authenticated user.
    fn list_folders(&self) -> ApiResult<Vec<String>>;

    /// Total item count for a content type, if the API exposes one.
    ///
    /// Used only to seed progress reporting; `None` is always a valid
    /// answer.
    fn total_count(&self, content_type: ContentType) -> ApiResult<Option<u64>> {
        let _ = content_type;
        Ok(None)
    }
}
