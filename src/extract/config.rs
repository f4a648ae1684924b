//! Extraction configuration and validation

/// Maximum allowed worker count to prevent self-inflicted rate limiting.
pub const MAX_WORKERS: usize = 50;

/// Default page size used both as the fetch `limit` and as the offset
/// increment per claim.
pub const DEFAULT_STRIDE: u64 = 100;

/// Default proactive request budget per minute.
pub const DEFAULT_REQUESTS_PER_MINUTE: usize = 120;

/// Default proactive request budget per second.
pub const DEFAULT_REQUESTS_PER_SECOND: usize = 10;

/// Configuration for a parallel extraction run.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Number of worker threads (1..=50)
    pub workers: usize,
    /// Page size / offset increment per claim
    pub stride: u64,
    /// Sliding-window cap: requests per trailing minute
    pub requests_per_minute: usize,
    /// Sliding-window cap: requests per trailing second
    pub requests_per_second: usize,
    /// Whether 429/success signals drive the backoff multiplier
    pub adaptive_rate_limiting: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            stride: DEFAULT_STRIDE,
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            adaptive_rate_limiting: true,
        }
    }
}

impl ExtractConfig {
    /// Validate configuration bounds.
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("workers must be at least 1".to_string());
        }
        if self.workers > MAX_WORKERS {
            return Err(format!(
                "workers {} exceeds maximum of {MAX_WORKERS}",
                self.workers
            ));
        }
        if self.stride == 0 {
            return Err("stride must be at least 1".to_string());
        }
        if self.requests_per_second == 0 || self.requests_per_minute == 0 {
            return Err("rate limits must be at least 1 request per window".to_string());
        }
        Ok(())
    }
}
