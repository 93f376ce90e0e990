//! Best-effort audit sink for security-relevant events.
//!
//! Events flow through a bounded channel to a background task that writes
//! structured log lines under the `audit` target. Recording must never block
//! or fail the primary operation: a full or closed channel drops the event
//! silently.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

const AUDIT_CHANNEL_CAPACITY: usize = 1024;

/// A security-relevant event worth an audit trail entry.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub kind: AuditKind,
    /// Client identity or job id the event concerns
    pub subject: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    RateLimitDenied,
    JobSubmitted,
    SuspiciousRequest,
}

impl AuditKind {
    fn as_str(&self) -> &'static str {
        match self {
            AuditKind::RateLimitDenied => "rate_limit_denied",
            AuditKind::JobSubmitted => "job_submitted",
            AuditKind::SuspiciousRequest => "suspicious_request",
        }
    }
}

/// Handle for recording audit events. Cheap to clone.
#[derive(Clone)]
pub struct AuditLog {
    sender: mpsc::Sender<AuditEvent>,
}

impl AuditLog {
    /// Spawn the sink task and return the recording handle.
    pub fn spawn() -> Self {
        let (sender, mut receiver) = mpsc::channel::<AuditEvent>(AUDIT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                tracing::info!(
                    target: "audit",
                    kind = event.kind.as_str(),
                    subject = %event.subject,
                    detail = %event.detail,
                    timestamp = %event.timestamp.to_rfc3339(),
                    "audit event"
                );
            }
        });

        Self { sender }
    }

    /// Record an event. Never blocks; a saturated sink drops the event.
    pub fn record(&self, kind: AuditKind, subject: impl Into<String>, detail: impl Into<String>) {
        let event = AuditEvent {
            kind,
            subject: subject.into(),
            detail: detail.into(),
            timestamp: Utc::now(),
        };
        if self.sender.try_send(event).is_err() {
            // Swallow: the audit trail is best-effort by contract.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_never_blocks_even_when_saturated() {
        let audit = AuditLog::spawn();
        for i in 0..(AUDIT_CHANNEL_CAPACITY * 2) {
            audit.record(AuditKind::RateLimitDenied, format!("client-{i}"), "denied");
        }
        // Reaching this line is the assertion.
    }
}
