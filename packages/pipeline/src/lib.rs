//! Quota-Governed Scraping Pipeline
//!
//! Ingests web pages, extracts structured food-truck records through an LLM
//! collaborator, persists them with dedup-merge, and scores their quality,
//! all under hard per-service API budgets.
//!
//! # Design
//!
//! - Three strictly-ordered stages per job: Fetch → Extract → Persist, with
//!   per-stage failure isolation and bounded job-level retries.
//! - The [`usage::ApiUsageMonitor`] is the sole gate in front of every
//!   metered external call; the processor never bypasses it.
//! - A fixed-window [`rate_limit::RateLimiter`] protects the process's own
//!   inbound surface.
//! - Every external collaborator sits behind a trait ([`traits`]) so the
//!   pipeline is testable against the mocks in [`testing`].
//!
//! # Modules
//!
//! - [`traits`] - Collaborator contracts (Fetcher, Extractor, stores, ledger)
//! - [`types`] - Jobs, truck entities, usage records
//! - [`processor`] - The stage state machine
//! - [`persist`] - Dedup-merge persistence
//! - [`rate_limit`] - Inbound fixed-window limiter
//! - [`usage`] - Usage ledger wiring and admission monitor
//! - [`retry`] - Backoff engine for transient failures
//! - [`quality`] - Deterministic record scoring
//! - [`stores`] - Storage implementations (memory, optional Postgres)
//! - [`fetch`] - HTTP fetch collaborator
//! - [`extract`] - Heuristic extraction collaborator
//! - [`testing`] - Mock collaborators for tests

pub mod error;
pub mod extract;
pub mod fetch;
pub mod persist;
pub mod processor;
pub mod quality;
pub mod rate_limit;
pub mod retry;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;
pub mod usage;

// Re-export core types at crate root
pub use error::{FetchError, PipelineError, Result, StoreError, StoreResult};
pub use processor::{PipelineConfig, PipelineProcessor, ProcessOutcome};
pub use quality::{
    calculate_quality_score, calculate_quality_score_at, rescore_all, QualityAssessment,
    QualityCategory,
};
pub use rate_limit::{
    LimitClass, RateLimitConfig, RateLimitDecision, RateLimitStats, RateLimitStatus, RateLimiter,
};
pub use retry::{default_should_retry, with_retry, RetryOutcome, RetryPolicy};
pub use traits::{
    Extraction, Extractor, FetchedPage, Fetcher, JobStore, JobUpdate, TruckStore, UsageLedger,
};
pub use types::{
    AlertLevel, ExtractedTruck, FoodTruck, JobStatus, ScrapingJob, ServiceUsage,
    ServiceUsageSnapshot, UsageAlert, UsageLimits, VerificationStatus,
};
pub use usage::{Admission, ApiUsageMonitor, UsageReport};

// Re-export stores
pub use stores::MemoryStore;

#[cfg(feature = "postgres")]
pub use stores::PostgresStore;

// Re-export collaborator implementations
pub use extract::MarkdownExtractor;
pub use fetch::HttpFetcher;
