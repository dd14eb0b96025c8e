use crate::deduplication::DeduplicationError;

/// Errors surfaced by the feed client.
///
/// `Clone` because one failure is handed to every coalesced caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("invalid backend url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("request {key} timed out after {timeout_ms}ms")]
    Timeout { key: String, timeout_ms: u64 },
    #[error("request coalescing failed: {0}")]
    Coalescing(String),
}

impl FeedError {
    /// Whether retrying the same request later can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::Http { .. } | FeedError::Timeout { .. } | FeedError::Coalescing(_) => true,
            FeedError::Status { status, .. } => *status >= 500 || *status == 429,
            FeedError::InvalidUrl { .. } | FeedError::Decode { .. } => false,
        }
    }
}

impl From<DeduplicationError<FeedError>> for FeedError {
    fn from(error: DeduplicationError<FeedError>) -> Self {
        match error {
            DeduplicationError::Upstream(inner) => inner,
            DeduplicationError::Timeout { key, timeout_ms } => FeedError::Timeout {
                key: key.to_string(),
                timeout_ms,
            },
            other => FeedError::Coalescing(other.to_string()),
        }
    }
}
