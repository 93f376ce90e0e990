//! Typed errors for the pipeline library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to keep the
//! transient / quota / permanent taxonomy checkable by callers.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while fetching a target page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request timed out
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// Connection-level failure (reset, refused, DNS)
    #[error("connection error: {0}")]
    Connection(String),

    /// Remote returned a non-success HTTP status
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// Remote rate-limited the request
    #[error("rate limited by {url}")]
    RateLimited { url: String },

    /// URL failed validation
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Fetch succeeded but produced no usable content
    #[error("empty content from {url}")]
    EmptyContent { url: String },
}

impl FetchError {
    /// Whether this failure is worth retrying at all.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. }
            | FetchError::Connection(_)
            | FetchError::RateLimited { .. } => true,
            FetchError::Http { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
            FetchError::InvalidUrl { .. } | FetchError::EmptyContent { .. } => false,
        }
    }
}

/// Errors raised by storage collaborators (job store, truck store, usage ledger).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record does not exist
    #[error("record not found: {id}")]
    NotFound { id: String },

    /// Write conflicted with existing state
    #[error("conflict: {0}")]
    Conflict(String),

    /// Backend failure (connection pool, I/O)
    #[error("storage backend error: {0}")]
    Backend(String),

    /// JSON (de)serialization of a stored document failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database error
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors that can occur while processing a scraping job.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Fetch stage failed
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The usage monitor denied a metered call
    #[error("API limit reached: {reason}")]
    QuotaExhausted {
        reason: String,
        wait_time: Option<Duration>,
    },

    /// Extraction collaborator failed or returned no payload
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Extracted payload failed validation (permanent)
    #[error("validation failed: {0}")]
    Validation(String),

    /// Persistence failed
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result type alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
