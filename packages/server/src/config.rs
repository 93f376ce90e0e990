//! Environment-driven configuration, read once at startup.

use std::time::Duration;

use anyhow::{Context, Result};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Postgres connection string; absent means the in-memory store
    pub database_url: Option<String>,
    /// Idle sleep between worker polls when the queue is drained
    pub worker_poll_interval: Duration,
    /// Age beyond which a `Running` job is considered orphaned and requeued
    pub stale_job_threshold: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = match std::env::var("PORT") {
            Ok(value) => value.parse::<u16>().context("PORT must be a number")?,
            Err(_) => 8080,
        };

        let database_url = std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());

        let worker_poll_interval = duration_from_env("WORKER_POLL_INTERVAL_MS", 1000)?;
        let stale_job_threshold = duration_from_env("STALE_JOB_THRESHOLD_MS", 10 * 60 * 1000)?;

        Ok(Self {
            port,
            database_url,
            worker_poll_interval,
            stale_job_threshold,
        })
    }
}

fn duration_from_env(key: &str, default_ms: u64) -> Result<Duration> {
    let millis = match std::env::var(key) {
        Ok(value) => value
            .parse::<u64>()
            .with_context(|| format!("{key} must be milliseconds"))?,
        Err(_) => default_ms,
    };
    Ok(Duration::from_millis(millis))
}
