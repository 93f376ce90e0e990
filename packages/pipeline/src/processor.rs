//! Pipeline processor: Fetch → Extract → Persist for one job.
//!
//! Stages run strictly in order; no stage starts before the prior one's
//! success is confirmed. The usage monitor is consulted before every metered
//! call and is never bypassed, including under retry pressure. Stage failures
//! are recorded on the job and handled by job-level retry, not stage-level
//! loops.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{FetchError, PipelineError, StoreResult};
use crate::persist::persist_extracted;
use crate::traits::{Extractor, Fetcher, JobStore, JobUpdate, TruckStore};
use crate::types::{FoodTruck, JobStatus, ScrapingJob};
use crate::usage::{ApiUsageMonitor, SERVICE_LLM, SERVICE_SCRAPER};

/// Tunables for job processing.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Delay before a failed job's next attempt
    pub retry_delay: Duration,
    /// Rough bytes-per-token ratio used to pre-estimate LLM consumption
    pub token_estimate_divisor: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(5),
            token_estimate_divisor: 4,
        }
    }
}

/// What happened to one processing attempt.
#[derive(Debug)]
pub enum ProcessOutcome {
    Completed {
        truck_id: Uuid,
    },
    /// Failed, re-queued for another attempt
    Retrying {
        retry_count: i32,
        next_run_at: DateTime<Utc>,
    },
    /// Failed terminally
    Failed {
        reason: String,
    },
}

/// How a stage failure should be handled at the job level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    /// Transient: worth a deferred whole-job re-attempt
    Retryable,
    /// Validation or quota: re-attempting cannot help until something changes
    Permanent,
}

struct StageFailure {
    message: String,
    kind: FailureKind,
}

impl StageFailure {
    fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FailureKind::Retryable,
        }
    }

    fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FailureKind::Permanent,
        }
    }
}

/// Orchestrates the three stages for claimed jobs.
pub struct PipelineProcessor {
    jobs: Arc<dyn JobStore>,
    trucks: Arc<dyn TruckStore>,
    monitor: Arc<ApiUsageMonitor>,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn Extractor>,
    config: PipelineConfig,
}

impl PipelineProcessor {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        trucks: Arc<dyn TruckStore>,
        monitor: Arc<ApiUsageMonitor>,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            jobs,
            trucks,
            monitor,
            fetcher,
            extractor,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Claim and process the next ready job. `Ok(None)` means the queue is
    /// drained.
    pub async fn run_next(&self) -> StoreResult<Option<ProcessOutcome>> {
        match self.jobs.claim_next_job().await? {
            Some(job) => Ok(Some(self.process(job).await?)),
            None => Ok(None),
        }
    }

    /// Process one claimed (`Running`) job through all three stages.
    ///
    /// Errors surface only for job-store bookkeeping failures; stage failures
    /// are captured on the job and reported in the outcome.
    pub async fn process(&self, job: ScrapingJob) -> StoreResult<ProcessOutcome> {
        tracing::info!(
            job_id = %job.id,
            url = %job.target_url,
            attempt = job.retry_count + 1,
            "processing scraping job"
        );

        if job.target_url.trim().is_empty() {
            return self
                .handle_failure(&job, StageFailure::permanent("No target URL specified"))
                .await;
        }

        match self.run_stages(&job).await {
            Ok((truck, collected)) => {
                self.jobs
                    .update_status(
                        job.id,
                        JobStatus::Completed,
                        JobUpdate {
                            collected_data: Some(collected),
                            errors: Vec::new(),
                            completed_at: Some(Utc::now()),
                        },
                    )
                    .await?;

                tracing::info!(
                    job_id = %job.id,
                    truck_id = %truck.id,
                    quality_score = truck.data_quality_score,
                    "scraping job completed"
                );
                Ok(ProcessOutcome::Completed { truck_id: truck.id })
            }
            Err(failure) => self.handle_failure(&job, failure).await,
        }
    }

    async fn run_stages(
        &self,
        job: &ScrapingJob,
    ) -> Result<(FoodTruck, serde_json::Value), StageFailure> {
        // Fetch
        let admission = self.monitor.can_make_request(SERVICE_SCRAPER, 1, 0).await;
        if !admission.allowed {
            return Err(StageFailure::permanent(admission.denial_message()));
        }

        let page = match self.fetcher.scrape(&job.target_url).await {
            Ok(page) => page,
            Err(error) => {
                let message = format!("Scraping failed: {error}");
                return Err(match error {
                    FetchError::InvalidUrl { .. } | FetchError::EmptyContent { .. } => {
                        StageFailure::permanent(message)
                    }
                    _ => StageFailure::retryable(message),
                });
            }
        };
        self.record_usage(SERVICE_SCRAPER, 1, 0).await;

        if page.markdown.trim().is_empty() {
            return Err(StageFailure::permanent(
                "Scraping failed or markdown content not found",
            ));
        }

        tracing::debug!(
            job_id = %job.id,
            content_length = page.markdown.len(),
            "fetch stage complete, proceeding to extraction"
        );

        // Extract
        let estimated_tokens = (page.markdown.len() / self.config.token_estimate_divisor) as u64;
        let admission = self
            .monitor
            .can_make_request(SERVICE_LLM, 1, estimated_tokens)
            .await;
        if !admission.allowed {
            return Err(StageFailure::permanent(admission.denial_message()));
        }

        let source_url = page.attribution_url().to_string();
        let extraction = match self.extractor.extract(&page.markdown, &source_url).await {
            Ok(extraction) => extraction,
            Err(PipelineError::Validation(message)) => {
                return Err(StageFailure::permanent(message))
            }
            Err(error) => {
                return Err(StageFailure::retryable(format!(
                    "Data extraction failed: {error}"
                )))
            }
        };
        self.record_usage(
            SERVICE_LLM,
            1,
            extraction.tokens_used.unwrap_or(estimated_tokens),
        )
        .await;

        if !extraction.truck.has_usable_name() {
            return Err(StageFailure::permanent(
                "Invalid food truck name - data discarded",
            ));
        }

        tracing::debug!(
            job_id = %job.id,
            name = %extraction.truck.name,
            "extract stage complete, proceeding to persist"
        );

        // Persist
        let collected = serde_json::to_value(&extraction.truck)
            .map_err(|e| StageFailure::retryable(format!("Failed to encode payload: {e}")))?;

        let truck = persist_extracted(self.trucks.as_ref(), extraction.truck, &source_url)
            .await
            .map_err(|e| {
                StageFailure::retryable(format!("Food truck data processing/saving failed: {e}"))
            })?;

        Ok((truck, collected))
    }

    /// Record the stage error and either re-queue the job for a deferred
    /// attempt or leave it terminally failed.
    async fn handle_failure(
        &self,
        job: &ScrapingJob,
        failure: StageFailure,
    ) -> StoreResult<ProcessOutcome> {
        tracing::warn!(
            job_id = %job.id,
            error = %failure.message,
            retryable = failure.kind == FailureKind::Retryable,
            "scraping job attempt failed"
        );

        self.jobs
            .update_status(job.id, JobStatus::Failed, JobUpdate::error(&failure.message))
            .await?;

        if failure.kind == FailureKind::Permanent {
            return Ok(ProcessOutcome::Failed {
                reason: failure.message,
            });
        }

        let job = self.jobs.increment_retry(job.id).await?;
        if job.has_retries_remaining() {
            let next_run_at = Utc::now()
                + chrono::Duration::from_std(self.config.retry_delay)
                    .unwrap_or_else(|_| chrono::Duration::seconds(5));
            self.jobs.requeue(job.id, next_run_at).await?;

            tracing::info!(
                job_id = %job.id,
                retry_count = job.retry_count,
                max_retries = job.max_retries,
                "job re-queued for retry"
            );
            Ok(ProcessOutcome::Retrying {
                retry_count: job.retry_count,
                next_run_at,
            })
        } else {
            tracing::warn!(
                job_id = %job.id,
                max_retries = job.max_retries,
                "job reached max retries"
            );
            Ok(ProcessOutcome::Failed {
                reason: failure.message,
            })
        }
    }

    /// Ledger bookkeeping must not fail a job that already did the work.
    async fn record_usage(&self, service: &str, requests: u64, tokens: u64) {
        if let Err(error) = self.monitor.record_usage(service, requests, tokens).await {
            tracing::warn!(service = %service, error = %error, "failed to record usage");
        }
    }
}
