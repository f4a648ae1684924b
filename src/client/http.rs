//! Blocking HTTP client for the hosted content API
//!
//! Provides a unified client for all API interactions with:
//! - Bearer-token authentication
//! - Offset/limit query-parameter pagination
//! - Distinguishable 429 responses for adaptive backoff upstream

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::client::{ApiError, ApiResult, ContentExtractor, RangeQuery};
use crate::{ContentRecord, ContentType};

/// Default request timeout for API calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Paginated listing envelope returned by the API
#[derive(Debug, Deserialize)]
struct ListEnvelope {
    #[serde(default)]
    data: Vec<serde_json::Value>,
    #[serde(default)]
    total: Option<u64>,
}

/// Folder listing item (only the id is needed for scoping)
#[derive(Debug, Deserialize)]
struct FolderItem {
    id: serde_json::Value,
}

/// Blocking REST client for paginated content listings
pub struct RestClient {
    client: Client,
    base_url: String,
    token: String,
}

impl RestClient {
    /// Create a new client for the given API base URL.
    ///
    /// # Arguments
    /// * `base_url` - Base URL without trailing slash (e.g., "<https://bi.example.com/api/v1>")
    /// * `token` - Bearer token for authentication
    ///
    /// # Errors
    /// Returns `ApiError::Http` if the underlying client cannot be built.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Http(e.to_string()))?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self {
            client,
            base_url,
            token: token.into(),
        })
    }

    /// Execute a GET and decode the standard listing envelope.
    fn get_envelope(&self, endpoint: &str, params: &[(&str, String)]) -> ApiResult<ListEnvelope> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!("GET {} with {} params", url, params.len());

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(params)
            .send()
            .map_err(|e| ApiError::Http(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Rate limited (429) on {}", endpoint);
            return Err(ApiError::RateLimited);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Auth(format!("{} returned {}", endpoint, status)));
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ApiError::Api(format!("{}: {} {}", endpoint, status, body)));
        }

        response
            .json::<ListEnvelope>()
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    fn build_params(query: &RangeQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("offset", query.offset.to_string()),
            ("limit", query.limit.to_string()),
        ];
        if let Some(folder_id) = &query.folder_id {
            params.push(("folder_id", folder_id.clone()));
        }
        if let Some(fields) = &query.fields {
            params.push(("fields", fields.clone()));
        }
        if let Some(updated_after) = &query.updated_after {
            params.push(("updated_after", updated_after.to_rfc3339()));
        }
        params
    }

    /// Convert one raw listing item into a [`ContentRecord`].
    fn parse_record(
        content_type: ContentType,
        raw: serde_json::Value,
    ) -> ApiResult<ContentRecord> {
        let id = raw
            .get("id")
            .map(json_value_to_string)
            .ok_or_else(|| ApiError::Parse("item missing 'id' field".to_string()))?;
        // Some content types (users, datasets) omit display names; fall
        // back to the id so records stay valid for storage.
        let name = raw
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| id.clone());
        let folder_id = raw.get("folder_id").map(json_value_to_string);
        let updated_at = raw
            .get("updated_at")
            .and_then(|v| v.as_str())
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc));

        Ok(ContentRecord {
            id,
            content_type,
            name,
            folder_id,
            updated_at,
            payload: raw,
        })
    }
}

/// Render a JSON scalar as the string form the API uses for identifiers.
///
/// Some deployments return numeric ids, others strings; both map to the
/// same storage key.
fn json_value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl ContentExtractor for RestClient {
    fn extract_range(&self, query: &RangeQuery) -> ApiResult<Vec<ContentRecord>> {
        let params = Self::build_params(query);
        let envelope = self.get_envelope(query.content_type.endpoint(), &params)?;

        envelope
            .data
            .into_iter()
            .map(|raw| Self::parse_record(query.content_type, raw))
            .collect()
    }

    fn list_folders(&self) -> ApiResult<Vec<String>> {
        let mut folders = Vec::new();
        let mut offset = 0u64;
        let limit = 100u64;

        loop {
            let params = vec![("offset", offset.to_string()), ("limit", limit.to_string())];
            let envelope = self.get_envelope(ContentType::Folders.endpoint(), &params)?;
            let page_len = envelope.data.len() as u64;

            for raw in envelope.data {
                let item: FolderItem = serde_json::from_value(raw)
                    .map_err(|e| ApiError::Parse(e.to_string()))?;
                folders.push(json_value_to_string(&item.id));
            }

            if page_len < limit {
                break;
            }
            offset += page_len;
        }

        Ok(folders)
    }

    fn total_count(&self, content_type: ContentType) -> ApiResult<Option<u64>> {
        let params = vec![("offset", "0".to_string()), ("limit", "1".to_string())];
        let envelope = self.get_envelope(content_type.endpoint(), &params)?;
        Ok(envelope.total)
    }
}
