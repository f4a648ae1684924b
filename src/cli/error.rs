//! CLI error types and conversions

use crate::client::ApiError;
use crate::extract::ExtractError;
use crate::storage::StorageError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// API client error
    #[error("api error: {0}")]
    ApiError(#[from] ApiError),

    /// Extraction engine error
    #[error("extraction error: {0}")]
    ExtractError(#[from] ExtractError),

    /// Storage error
    #[error("storage error: {0}")]
    StorageError(#[from] StorageError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Run finished but recorded errors
    #[error("run completed with {0} errors")]
    CompletedWithErrors(u64),
}
