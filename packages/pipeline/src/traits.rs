//! Collaborator contracts for the pipeline stages.
//!
//! Every external dependency sits behind a trait so the processor can be
//! exercised against mocks (see [`crate::testing`]). Contracts are tagged
//! results (`Ok`/`Err`), not optional-field bags, so handling stays
//! exhaustive at the type level.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{FetchError, PipelineError, StoreResult};
use crate::types::{FoodTruck, JobStatus, ScrapingJob, ServiceUsage};

/// A fetched page ready for extraction.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// The URL that was requested
    pub url: String,
    /// Markdown rendition of the page content
    pub markdown: String,
    /// Final URL after redirects, when it differs from the request
    pub source_url: Option<String>,
    pub title: Option<String>,
}

impl FetchedPage {
    /// The URL the content should be attributed to.
    pub fn attribution_url(&self) -> &str {
        self.source_url.as_deref().unwrap_or(&self.url)
    }
}

/// Page-fetch collaborator (web scraper).
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// Output of the extraction collaborator.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub truck: crate::types::ExtractedTruck,
    /// Tokens the provider reported consuming, when known
    pub tokens_used: Option<u64>,
}

/// Structured-extraction collaborator (LLM).
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, markdown: &str, source_url: &str) -> Result<Extraction, PipelineError>;
}

/// Fields a status transition may set alongside the new status.
///
/// `errors` are appended to the job's error list, never overwritten.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub collected_data: Option<serde_json::Value>,
    pub errors: Vec<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            ..Default::default()
        }
    }
}

/// Persistent job queue.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &ScrapingJob) -> StoreResult<ScrapingJob>;

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<ScrapingJob>>;

    async fn get_jobs_by_status(&self, status: JobStatus) -> StoreResult<Vec<ScrapingJob>>;

    /// Atomically claim the next ready job: highest priority first, then
    /// earliest `scheduled_at`. The claimed job transitions to `Running`
    /// with `started_at` stamped. At most one active attempt per job id.
    async fn claim_next_job(&self) -> StoreResult<Option<ScrapingJob>>;

    /// Transition a job's status, applying `update` in the same write.
    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        update: JobUpdate,
    ) -> StoreResult<ScrapingJob>;

    /// Bump `retry_count`, returning the updated job.
    async fn increment_retry(&self, id: Uuid) -> StoreResult<ScrapingJob>;

    /// Re-queue a failed job as `Pending` with a deferred `scheduled_at`.
    async fn requeue(&self, id: Uuid, run_at: DateTime<Utc>) -> StoreResult<ScrapingJob>;

    /// Requeue `Running` jobs whose attempt started more than `older_than`
    /// ago (crashed worker recovery). Returns the number requeued.
    async fn requeue_stale_running(&self, older_than: Duration) -> StoreResult<u64>;
}

/// Persistent food-truck records.
#[async_trait]
pub trait TruckStore: Send + Sync {
    async fn create_truck(&self, truck: &FoodTruck) -> StoreResult<FoodTruck>;

    async fn update_truck(&self, truck: &FoodTruck) -> StoreResult<FoodTruck>;

    async fn get_truck(&self, id: Uuid) -> StoreResult<Option<FoodTruck>>;

    /// Dedup candidates: records whose name matches (case-insensitive) or
    /// whose `source_urls` contain `source_url`.
    async fn find_by_name_or_url(
        &self,
        name: &str,
        source_url: &str,
    ) -> StoreResult<Vec<FoodTruck>>;

    async fn list_trucks(&self) -> StoreResult<Vec<FoodTruck>>;
}

/// Daily/hourly usage counters, persisted externally.
///
/// Daily rows are keyed by UTC calendar day and monotonically incremented.
/// The hourly view is a rolling approximation over the same counters.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Usage for the current UTC day; `None` means no usage recorded yet.
    async fn get_today_usage(&self, service: &str) -> StoreResult<Option<ServiceUsage>>;

    /// Usage within the current UTC hour.
    async fn get_hour_usage(&self, service: &str) -> StoreResult<Option<ServiceUsage>>;

    async fn increment_usage(&self, service: &str, requests: u64, tokens: u64) -> StoreResult<()>;
}
