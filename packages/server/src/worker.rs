//! Background job worker.
//!
//! Polls the job store through the pipeline processor, with a short idle
//! backoff when the queue is drained and a periodic reap of orphaned
//! `Running` jobs (crashed or shut-down workers).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use pipeline::{JobStore, PipelineProcessor};

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// Sleep between polls when no job is ready
    pub poll_interval: Duration,
    /// Age beyond which a `Running` job is treated as orphaned
    pub stale_job_threshold: Duration,
    /// How often to sweep for orphaned jobs
    pub reap_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            stale_job_threshold: Duration::from_secs(10 * 60),
            reap_interval: Duration::from_secs(60),
        }
    }
}

pub struct Worker {
    processor: Arc<PipelineProcessor>,
    jobs: Arc<dyn JobStore>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(processor: Arc<PipelineProcessor>, jobs: Arc<dyn JobStore>) -> Self {
        Self {
            processor,
            jobs,
            config: WorkerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Run until `shutdown` is cancelled. A job failure never stops the
    /// worker; store errors back off briefly and continue.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "job worker starting"
        );
        let mut last_reap = Instant::now();

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if last_reap.elapsed() >= self.config.reap_interval {
                last_reap = Instant::now();
                match self
                    .jobs
                    .requeue_stale_running(self.config.stale_job_threshold)
                    .await
                {
                    Ok(0) => {}
                    Ok(requeued) => {
                        tracing::warn!(requeued, "requeued orphaned running jobs");
                    }
                    Err(e) => tracing::error!(error = %e, "stale job sweep failed"),
                }
            }

            match self.processor.run_next().await {
                // Job processed (in whatever direction): try the next one now.
                Ok(Some(_)) => continue,
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "job store error while claiming");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
            }
        }

        tracing::info!("job worker stopped");
    }
}
