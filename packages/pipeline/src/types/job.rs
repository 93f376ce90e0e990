//! Scraping job model and state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a scraping job.
///
/// `Pending -> Running -> {Completed | Failed}`; a `Failed` job loops back to
/// `Pending` through job-level retry while `retry_count < max_retries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of scraping work targeting a single URL.
///
/// Created by a producer (HTTP surface or scheduler), mutated only by the
/// pipeline processor through job-store transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingJob {
    pub id: Uuid,
    pub target_url: String,
    pub status: JobStatus,
    /// Higher runs first
    pub priority: i32,
    pub retry_count: i32,
    pub max_retries: i32,
    /// Earliest time the job may be claimed
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Extracted payload, stored on completion
    pub collected_data: Option<serde_json::Value>,
    /// Stage errors, appended across attempts (never overwritten)
    pub errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScrapingJob {
    /// Create an immediately-runnable job with default retry budget.
    pub fn new(target_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            target_url: target_url.into(),
            status: JobStatus::Pending,
            priority: 0,
            retry_count: 0,
            max_retries: 3,
            scheduled_at: now,
            started_at: None,
            completed_at: None,
            collected_data: None,
            errors: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Whether the job can be claimed for an attempt at `now`.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.scheduled_at <= now
    }

    /// Whether the job will never run again.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            JobStatus::Completed => true,
            JobStatus::Failed => self.retry_count >= self.max_retries,
            _ => false,
        }
    }

    /// Whether another job-level retry is available after a failure.
    pub fn has_retries_remaining(&self) -> bool {
        self.retry_count < self.max_retries
    }
}
