//! Admission control and alerting over the usage ledger.
//!
//! The monitor is the sole gate in front of every metered external call.
//! Admission is predictive: a request is denied when the *projected* usage
//! (current + requested) would exceed a daily or hourly budget, or would
//! push request usage past the critical threshold.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::error::StoreResult;
use crate::traits::UsageLedger;
use crate::types::{
    AlertLevel, MetricUsage, ServiceUsage, ServiceUsageSnapshot, UsageAlert, UsageLimits,
};
use crate::usage::{default_service_limits, time_until_day_reset, time_until_hour_reset};

const MAX_ALERT_HISTORY: usize = 100;

/// Decision for one prospective metered call.
#[derive(Debug, Clone, Serialize)]
pub struct Admission {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Time until the relevant window resets, set when denied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_time: Option<Duration>,
}

impl Admission {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            wait_time: None,
        }
    }

    fn denied(reason: String, wait_time: Duration) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            wait_time: Some(wait_time),
        }
    }

    /// User-visible denial message: "API limit reached: ..., retry in N minutes".
    pub fn denial_message(&self) -> String {
        let reason = self.reason.as_deref().unwrap_or("usage limit exceeded");
        match self.wait_time {
            Some(wait) => {
                let minutes = wait.as_secs().div_ceil(60).max(1);
                format!("API limit reached: {reason}, retry in {minutes} minutes")
            }
            None => format!("API limit reached: {reason}"),
        }
    }
}

/// Consolidated snapshot across every configured service.
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub can_make_request: bool,
    pub alerts: Vec<UsageAlert>,
    pub usage: HashMap<String, ServiceUsageSnapshot>,
    pub recommendations: Vec<String>,
}

/// Wraps a [`UsageLedger`] with declared per-service limits, computing
/// admission decisions and threshold alerts.
pub struct ApiUsageMonitor {
    ledger: Arc<dyn UsageLedger>,
    limits: HashMap<String, UsageLimits>,
    alert_history: Mutex<VecDeque<UsageAlert>>,
    /// Alert keys already emitted, idempotent per (service, level, UTC day)
    emitted: Mutex<HashSet<(String, AlertLevel, NaiveDate)>>,
}

impl ApiUsageMonitor {
    pub fn new(ledger: Arc<dyn UsageLedger>) -> Self {
        Self::with_limits(ledger, default_service_limits())
    }

    pub fn with_limits(ledger: Arc<dyn UsageLedger>, limits: HashMap<String, UsageLimits>) -> Self {
        Self {
            ledger,
            limits,
            alert_history: Mutex::new(VecDeque::new()),
            emitted: Mutex::new(HashSet::new()),
        }
    }

    pub fn configured_services(&self) -> Vec<String> {
        let mut services: Vec<String> = self.limits.keys().cloned().collect();
        services.sort();
        services
    }

    /// Whether a call consuming `requests`/`tokens` may proceed.
    ///
    /// Ledger read failures fail open: the call is allowed and the error is
    /// logged, so a broken ledger cannot wedge the pipeline.
    pub async fn can_make_request(&self, service: &str, requests: u64, tokens: u64) -> Admission {
        let Some(limits) = self.limits.get(service) else {
            tracing::warn!(service = %service, "no usage limits configured, allowing request");
            return Admission::allowed();
        };

        let today = match self.ledger.get_today_usage(service).await {
            Ok(usage) => usage.unwrap_or_default(),
            Err(e) => {
                tracing::error!(service = %service, error = %e, "usage ledger read failed, allowing request");
                return Admission::allowed();
            }
        };

        let now = Utc::now();
        let projected_requests = today.requests_used + requests;
        let projected_tokens = today.tokens_used + tokens;

        if projected_requests > limits.requests_daily {
            return Admission::denied(
                format!(
                    "daily request limit exceeded ({projected_requests}/{})",
                    limits.requests_daily
                ),
                time_until_day_reset(now),
            );
        }

        if limits.tracks_tokens() && projected_tokens > limits.tokens_daily {
            return Admission::denied(
                format!(
                    "daily token limit exceeded ({projected_tokens}/{})",
                    limits.tokens_daily
                ),
                time_until_day_reset(now),
            );
        }

        if limits.requests_hourly > 0 || limits.tokens_hourly > 0 {
            let hour = match self.ledger.get_hour_usage(service).await {
                Ok(usage) => usage.unwrap_or_default(),
                Err(e) => {
                    tracing::error!(service = %service, error = %e, "usage ledger read failed, allowing request");
                    return Admission::allowed();
                }
            };

            if limits.requests_hourly > 0 && hour.requests_used + requests > limits.requests_hourly
            {
                return Admission::denied(
                    format!(
                        "hourly request limit exceeded ({}/{})",
                        hour.requests_used + requests,
                        limits.requests_hourly
                    ),
                    time_until_hour_reset(now),
                );
            }

            if limits.tokens_hourly > 0 && hour.tokens_used + tokens > limits.tokens_hourly {
                return Admission::denied(
                    format!(
                        "hourly token limit exceeded ({}/{})",
                        hour.tokens_used + tokens,
                        limits.tokens_hourly
                    ),
                    time_until_hour_reset(now),
                );
            }
        }

        // Predictive denial: refuse to cross the critical threshold even
        // before the hard limit is reached.
        let request_share = projected_requests as f64 / limits.requests_daily as f64;
        if request_share > limits.critical_threshold {
            return Admission::denied(
                format!(
                    "approaching critical usage threshold ({:.1}%)",
                    request_share * 100.0
                ),
                time_until_day_reset(now),
            );
        }

        Admission::allowed()
    }

    /// Record consumption after a successful metered call.
    pub async fn record_usage(&self, service: &str, requests: u64, tokens: u64) -> StoreResult<()> {
        self.ledger.increment_usage(service, requests, tokens).await
    }

    /// Current usage against daily limits, for dashboards.
    pub async fn get_current_usage(
        &self,
        service: &str,
    ) -> StoreResult<Option<ServiceUsageSnapshot>> {
        let Some(limits) = self.limits.get(service) else {
            return Ok(None);
        };

        let today = self
            .ledger
            .get_today_usage(service)
            .await?
            .unwrap_or_default();

        Ok(Some(snapshot_for(&today, limits)))
    }

    /// Consolidated monitoring pass over every configured service.
    pub async fn check_all_apis(&self) -> UsageReport {
        let now = Utc::now();
        let mut alerts = Vec::new();
        let mut usage = HashMap::new();
        let mut can_make_request = true;

        for (service, limits) in &self.limits {
            let today = match self.ledger.get_today_usage(service).await {
                Ok(today) => today.unwrap_or_default(),
                Err(e) => {
                    tracing::error!(service = %service, error = %e, "failed to read usage");
                    continue;
                }
            };

            let snapshot = snapshot_for(&today, limits);

            if snapshot.requests.percentage > limits.critical_threshold * 100.0 {
                can_make_request = false;
            }

            alerts.extend(self.generate_alerts(service, &snapshot, limits, now));
            usage.insert(service.clone(), snapshot);
        }

        let recommendations = generate_recommendations(&usage, &alerts);

        UsageReport {
            can_make_request,
            alerts,
            usage,
            recommendations,
        }
    }

    /// Alerts for one service, deduplicated per (service, level, UTC day)
    /// and appended to the capped history.
    fn generate_alerts(
        &self,
        service: &str,
        snapshot: &ServiceUsageSnapshot,
        limits: &UsageLimits,
        now: DateTime<Utc>,
    ) -> Vec<UsageAlert> {
        let mut alerts = Vec::new();

        if let Some(alert) = threshold_alert(service, "requests", &snapshot.requests, limits, now) {
            alerts.push(alert);
        }
        if let Some(tokens) = &snapshot.tokens {
            if let Some(alert) = threshold_alert(service, "tokens", tokens, limits, now) {
                alerts.push(alert);
            }
        }

        let today = now.date_naive();
        let mut emitted = self.emitted.lock().expect("alert set poisoned");
        emitted.retain(|(_, _, day)| *day == today);

        let alerts: Vec<UsageAlert> = alerts
            .into_iter()
            .filter(|alert| emitted.insert((alert.service.clone(), alert.level, today)))
            .collect();
        drop(emitted);

        if !alerts.is_empty() {
            let mut history = self.alert_history.lock().expect("alert history poisoned");
            for alert in &alerts {
                tracing::warn!(
                    service = %alert.service,
                    level = alert.level.as_str(),
                    metric = %alert.metric,
                    percentage = alert.percentage,
                    "usage alert"
                );
                history.push_back(alert.clone());
            }
            while history.len() > MAX_ALERT_HISTORY {
                history.pop_front();
            }
        }

        alerts
    }

    pub fn alert_history(&self) -> Vec<UsageAlert> {
        self.alert_history
            .lock()
            .expect("alert history poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear_alert_history(&self) {
        self.alert_history
            .lock()
            .expect("alert history poisoned")
            .clear();
        self.emitted.lock().expect("alert set poisoned").clear();
    }
}

fn snapshot_for(usage: &ServiceUsage, limits: &UsageLimits) -> ServiceUsageSnapshot {
    ServiceUsageSnapshot {
        requests: MetricUsage::new(usage.requests_used, limits.requests_daily),
        tokens: limits
            .tracks_tokens()
            .then(|| MetricUsage::new(usage.tokens_used, limits.tokens_daily)),
    }
}

fn threshold_alert(
    service: &str,
    metric: &str,
    usage: &MetricUsage,
    limits: &UsageLimits,
    now: DateTime<Utc>,
) -> Option<UsageAlert> {
    let (level, recommendations) = if usage.percentage > limits.critical_threshold * 100.0 {
        (
            AlertLevel::Critical,
            match metric {
                "tokens" => vec![
                    "Reduce prompt size and batch extractions".to_string(),
                    "Cache extraction results for repeated pages".to_string(),
                ],
                _ => vec![
                    "Immediately reduce API calls".to_string(),
                    "Queue non-urgent requests".to_string(),
                    "Consider upgrading the API plan".to_string(),
                ],
            },
        )
    } else if usage.percentage > limits.warning_threshold * 100.0 {
        (
            AlertLevel::Warning,
            match metric {
                "tokens" => vec![
                    "Monitor token consumption".to_string(),
                    "Reduce token usage per request".to_string(),
                ],
                _ => vec![
                    "Monitor usage closely".to_string(),
                    "Queue non-urgent requests".to_string(),
                ],
            },
        )
    } else {
        return None;
    };

    Some(UsageAlert {
        service: service.to_string(),
        level,
        metric: metric.to_string(),
        message: format!(
            "{}: {service} {metric} usage at {:.1}%",
            match level {
                AlertLevel::Critical => "Critical",
                AlertLevel::Warning => "Warning",
                AlertLevel::Info => "Info",
            },
            usage.percentage
        ),
        current_usage: usage.used,
        limit: usage.limit,
        percentage: usage.percentage,
        timestamp: now,
        recommendations,
    })
}

fn generate_recommendations(
    usage: &HashMap<String, ServiceUsageSnapshot>,
    alerts: &[UsageAlert],
) -> Vec<String> {
    let mut recommendations: Vec<String> = Vec::new();
    let mut push = |r: &str| {
        if !recommendations.iter().any(|existing| existing == r) {
            recommendations.push(r.to_string());
        }
    };

    if alerts.iter().any(|a| a.level == AlertLevel::Critical) {
        push("URGENT: throttle outbound API calls now");
        push("Enable aggressive caching for all API responses");
    }
    if alerts.iter().any(|a| a.level == AlertLevel::Warning) {
        push("Queue and batch non-urgent requests");
        push("Enable response caching where possible");
    }

    if usage
        .get(crate::usage::SERVICE_LLM)
        .is_some_and(|s| s.requests.percentage > 70.0)
    {
        push("llm: shorten prompts and batch extractions");
    }
    if usage
        .get(crate::usage::SERVICE_SCRAPER)
        .is_some_and(|s| s.requests.percentage > 70.0)
    {
        push("scraper: deduplicate target URLs and cache fetched pages");
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::usage::{SERVICE_LLM, SERVICE_SCRAPER};
    use async_trait::async_trait;
    use crate::error::StoreError;

    fn monitor_with_store() -> (ApiUsageMonitor, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let monitor = ApiUsageMonitor::new(store.clone());
        (monitor, store)
    }

    /// Limits without hourly caps, to exercise daily accounting alone.
    fn daily_only_limits() -> HashMap<String, UsageLimits> {
        let mut limits = HashMap::new();
        limits.insert(
            SERVICE_LLM.to_string(),
            UsageLimits {
                requests_daily: 1500,
                requests_hourly: 0,
                tokens_daily: 32_000,
                tokens_hourly: 0,
                warning_threshold: 0.8,
                critical_threshold: 1.0,
            },
        );
        limits
    }

    #[tokio::test]
    async fn absent_usage_record_allows_request() {
        let (monitor, _) = monitor_with_store();
        let admission = monitor.can_make_request(SERVICE_LLM, 1, 100).await;
        assert!(admission.allowed);
    }

    #[tokio::test]
    async fn unknown_service_fails_open() {
        let (monitor, _) = monitor_with_store();
        let admission = monitor.can_make_request("telemetry", 1, 0).await;
        assert!(admission.allowed);
    }

    #[tokio::test]
    async fn daily_request_limit_is_a_hard_boundary() {
        let store = Arc::new(MemoryStore::new());
        let monitor = ApiUsageMonitor::with_limits(store.clone(), daily_only_limits());
        store.increment_usage(SERVICE_LLM, 1499, 100).await.unwrap();

        let admission = monitor.can_make_request(SERVICE_LLM, 1, 50).await;
        assert!(admission.allowed, "1499 + 1 fits the 1500 budget");

        let admission = monitor.can_make_request(SERVICE_LLM, 2, 50).await;
        assert!(!admission.allowed, "1499 + 2 exceeds the 1500 budget");
        assert!(admission.reason.unwrap().contains("daily request limit"));
        assert!(admission.wait_time.is_some());
    }

    #[tokio::test]
    async fn daily_token_limit_denies_projected_overage() {
        let store = Arc::new(MemoryStore::new());
        let monitor = ApiUsageMonitor::with_limits(store.clone(), daily_only_limits());
        store
            .increment_usage(SERVICE_LLM, 10, 31_990)
            .await
            .unwrap();

        let admission = monitor.can_make_request(SERVICE_LLM, 1, 11).await;
        assert!(!admission.allowed);
        assert!(admission.reason.unwrap().contains("daily token limit"));
    }

    #[tokio::test]
    async fn hourly_request_limit_denies_with_hour_wait() {
        let (monitor, store) = monitor_with_store();
        store.increment_usage(SERVICE_SCRAPER, 50, 0).await.unwrap();

        let admission = monitor.can_make_request(SERVICE_SCRAPER, 1, 0).await;
        assert!(!admission.allowed);
        assert!(admission.reason.unwrap().contains("hourly request limit"));
        assert!(admission.wait_time.unwrap() <= Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn critical_threshold_denies_before_hard_limit() {
        let (monitor, store) = monitor_with_store();
        // 96% of the 500/day scraper budget, spread over past hours so the
        // hourly check does not trip first.
        store.increment_usage(SERVICE_SCRAPER, 30, 0).await.unwrap();
        store
            .backdate_daily_usage(SERVICE_SCRAPER, 450, 0)
            .await;

        let admission = monitor.can_make_request(SERVICE_SCRAPER, 1, 0).await;
        assert!(!admission.allowed);
        assert!(admission
            .reason
            .unwrap()
            .contains("critical usage threshold"));
    }

    #[tokio::test]
    async fn ledger_failure_fails_open() {
        struct FailingLedger;

        #[async_trait]
        impl UsageLedger for FailingLedger {
            async fn get_today_usage(&self, _: &str) -> StoreResult<Option<ServiceUsage>> {
                Err(StoreError::Backend("connection refused".to_string()))
            }
            async fn get_hour_usage(&self, _: &str) -> StoreResult<Option<ServiceUsage>> {
                Err(StoreError::Backend("connection refused".to_string()))
            }
            async fn increment_usage(&self, _: &str, _: u64, _: u64) -> StoreResult<()> {
                Err(StoreError::Backend("connection refused".to_string()))
            }
        }

        let monitor = ApiUsageMonitor::new(Arc::new(FailingLedger));
        let admission = monitor.can_make_request(SERVICE_LLM, 1, 10).await;
        assert!(admission.allowed);
    }

    #[tokio::test]
    async fn warning_alert_is_idempotent_within_a_day() {
        let (monitor, store) = monitor_with_store();
        // 85% of the llm daily request budget.
        store
            .backdate_daily_usage(SERVICE_LLM, 1275, 0)
            .await;

        let first = monitor.check_all_apis().await;
        let llm_alerts: Vec<_> = first
            .alerts
            .iter()
            .filter(|a| a.service == SERVICE_LLM)
            .collect();
        assert_eq!(llm_alerts.len(), 1);
        assert_eq!(llm_alerts[0].level, AlertLevel::Warning);

        let second = monitor.check_all_apis().await;
        assert!(
            second.alerts.iter().all(|a| a.service != SERVICE_LLM),
            "same threshold crossing must not re-alert within the day"
        );

        // Both passes still show the usage snapshot.
        assert!(second.usage.contains_key(SERVICE_LLM));
        assert_eq!(monitor.alert_history().len(), 1);
    }

    #[tokio::test]
    async fn critical_usage_blocks_global_can_make_request() {
        let (monitor, store) = monitor_with_store();
        store
            .backdate_daily_usage(SERVICE_LLM, 1480, 0)
            .await;

        let report = monitor.check_all_apis().await;
        assert!(!report.can_make_request);
        assert!(report
            .alerts
            .iter()
            .any(|a| a.service == SERVICE_LLM && a.level == AlertLevel::Critical));
        assert!(!report.recommendations.is_empty());
    }

    #[tokio::test]
    async fn clear_alert_history_allows_reemission() {
        let (monitor, store) = monitor_with_store();
        store
            .backdate_daily_usage(SERVICE_LLM, 1275, 0)
            .await;

        assert_eq!(monitor.check_all_apis().await.alerts.len(), 1);
        monitor.clear_alert_history();
        assert!(monitor.alert_history().is_empty());
        assert_eq!(monitor.check_all_apis().await.alerts.len(), 1);
    }

    #[tokio::test]
    async fn denial_message_is_user_readable() {
        let admission = Admission::denied(
            "daily request limit exceeded (1501/1500)".to_string(),
            Duration::from_secs(3600),
        );
        let message = admission.denial_message();
        assert!(message.starts_with("API limit reached:"));
        assert!(message.contains("retry in 60 minutes"));
    }
}
