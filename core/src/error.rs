use thiserror::Error;

/// Failures surfaced by the upstream adapter and the orchestration around it.
///
/// Only `RateLimited` mutates shared state (the quota tracker, and only the
/// orchestrator writes it). `Malformed` and `Unavailable` are local to a
/// single call and absorbed by falling back to the next tier or the cache.
/// `Cancelled` is not a real error: a superseded operation drops its result
/// without touching the cache or the quota tracker.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The upstream rejected the call for quota reasons (HTTP 429 or an
    /// explicit RESOURCE_EXHAUSTED status).
    #[error("upstream rate limited")]
    RateLimited {
        /// Server-suggested backoff, when the response carried one.
        retry_after_secs: Option<u64>,
    },

    /// The upstream responded but no event array could be extracted from the
    /// payload.
    #[error("malformed upstream payload: {0}")]
    Malformed(String),

    /// Transport-level failure (connect, timeout, non-quota HTTP error).
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    /// The operation was superseded by a newer request for the same key.
    #[error("operation cancelled")]
    Cancelled,
}

impl FetchError {
    /// True when the failure is quota-scoped rather than call-scoped.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }
}

/// Failures inside the storage layer.
///
/// These never escape the cache store: capacity pressure triggers eviction
/// and a retry, everything else degrades the cache to a no-op.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store refused the write for size reasons.
    #[error("store capacity exceeded")]
    CapacityExceeded,

    /// The backing store is unreadable or unwritable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A persisted value failed to deserialize.
    #[error("corrupt store entry: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}
