//! Usage accounting types: per-service counters, limits, and alerts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters for one service within one accounting window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUsage {
    pub requests_used: u64,
    pub tokens_used: u64,
}

/// Static per-service budgets. A zero token budget means the service is not
/// token-metered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UsageLimits {
    pub requests_daily: u64,
    pub requests_hourly: u64,
    pub tokens_daily: u64,
    pub tokens_hourly: u64,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
}

impl UsageLimits {
    pub fn tracks_tokens(&self) -> bool {
        self.tokens_daily > 0
    }
}

/// Severity of a usage alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }
}

/// A derived threshold-crossing alert. Not a source of truth; kept in a
/// bounded in-memory history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageAlert {
    pub service: String,
    pub level: AlertLevel,
    /// Which budget crossed the threshold ("requests" or "tokens")
    pub metric: String,
    pub message: String,
    pub current_usage: u64,
    pub limit: u64,
    pub percentage: f64,
    pub timestamp: DateTime<Utc>,
    pub recommendations: Vec<String>,
}

/// Usage of one metric against its daily limit, for dashboards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricUsage {
    pub used: u64,
    pub limit: u64,
    pub percentage: f64,
}

impl MetricUsage {
    pub fn new(used: u64, limit: u64) -> Self {
        let percentage = if limit > 0 {
            (used as f64 / limit as f64) * 100.0
        } else {
            0.0
        };
        Self {
            used,
            limit,
            percentage,
        }
    }
}

/// Per-service usage snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceUsageSnapshot {
    pub requests: MetricUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<MetricUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_usage_computes_percentage() {
        let usage = MetricUsage::new(1200, 1500);
        assert!((usage.percentage - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_limit_yields_zero_percentage() {
        let usage = MetricUsage::new(10, 0);
        assert_eq!(usage.percentage, 0.0);
    }
}
