//! Bounded-attempt retry with exponential backoff and jitter.
//!
//! Generic over the operation and its error type; used for transient HTTP
//! calls inside pipeline stages. Job-level retry reuses the same policy
//! through the job store's deferred re-queueing.

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::error::{PipelineError, StoreError};

/// Backoff schedule for retried operations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub use_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay before the attempt after `attempt` (1-based):
    /// `min(initial * multiplier^(attempt-1), max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = self.initial_delay.as_millis() as f64 * exp;
        Duration::from_millis(millis.min(self.max_delay.as_millis() as f64) as u64)
    }

    /// Delay with ±10% uniform jitter applied when enabled.
    fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.delay_for(attempt);
        if !self.use_jitter {
            return base;
        }
        let factor = rand::thread_rng().gen_range(0.9..=1.1);
        Duration::from_millis((base.as_millis() as f64 * factor) as u64)
    }
}

/// Result of a retried operation: the final outcome plus how much work it took.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
    pub elapsed: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run `op` until it succeeds, the predicate declines, or attempts run out.
///
/// `op` receives the 1-based attempt number. `should_retry` is consulted
/// after each failure (except the last attempt, which can never retry).
pub async fn with_retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    should_retry: P,
    mut op: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E, u32) -> bool,
{
    let started = Instant::now();
    let mut attempts = 0;
    let mut last_error: Option<E> = None;

    for attempt in 1..=policy.max_attempts.max(1) {
        attempts = attempt;
        match op(attempt).await {
            Ok(data) => {
                return RetryOutcome {
                    result: Ok(data),
                    attempts,
                    elapsed: started.elapsed(),
                }
            }
            Err(error) => {
                let final_attempt = attempt >= policy.max_attempts;
                if final_attempt || !should_retry(&error, attempt) {
                    last_error = Some(error);
                    break;
                }

                let delay = policy.jittered_delay(attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "operation failed, retrying"
                );
                last_error = Some(error);
                tokio::time::sleep(delay).await;
            }
        }
    }

    RetryOutcome {
        result: Err(last_error.expect("retry loop exited without error")),
        attempts,
        elapsed: started.elapsed(),
    }
}

/// Default retry predicate: transient network failures, HTTP 5xx/429/408,
/// and error messages matching timeout/connection/rate-limit patterns.
pub fn default_should_retry(error: &PipelineError, _attempt: u32) -> bool {
    match error {
        PipelineError::Fetch(fetch) => fetch.is_transient(),
        PipelineError::Storage(store) => match store {
            StoreError::Backend(message) => is_transient_message(message),
            _ => false,
        },
        PipelineError::Extraction(message) => is_transient_message(message),
        PipelineError::QuotaExhausted { .. } | PipelineError::Validation(_) => false,
    }
}

fn is_transient_message(message: &str) -> bool {
    let message = message.to_lowercase();
    ["timeout", "timed out", "connection", "reset", "rate limit", "too many requests"]
        .iter()
        .any(|pattern| message.contains(pattern))
}
