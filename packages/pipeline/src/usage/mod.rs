//! API usage accounting: service budgets and the admission monitor.

pub mod monitor;

pub use monitor::{Admission, ApiUsageMonitor, UsageReport};

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};

use crate::types::UsageLimits;

/// Token-metered LLM extraction service.
pub const SERVICE_LLM: &str = "llm";
/// Page-fetch service.
pub const SERVICE_SCRAPER: &str = "scraper";
/// Web-search service.
pub const SERVICE_SEARCH: &str = "search";
/// Persistence service.
pub const SERVICE_DB: &str = "db";

/// Shipped per-service budgets. Declared centrally; not hot-reloadable.
pub fn default_service_limits() -> HashMap<String, UsageLimits> {
    let mut limits = HashMap::new();
    limits.insert(
        SERVICE_LLM.to_string(),
        UsageLimits {
            requests_daily: 1500,
            requests_hourly: 100,
            tokens_daily: 32_000,
            tokens_hourly: 2000,
            warning_threshold: 0.8,
            critical_threshold: 0.95,
        },
    );
    limits.insert(
        SERVICE_SCRAPER.to_string(),
        UsageLimits {
            requests_daily: 500,
            requests_hourly: 50,
            tokens_daily: 0,
            tokens_hourly: 0,
            warning_threshold: 0.8,
            critical_threshold: 0.95,
        },
    );
    limits.insert(
        SERVICE_SEARCH.to_string(),
        UsageLimits {
            requests_daily: 1000,
            requests_hourly: 100,
            tokens_daily: 0,
            tokens_hourly: 0,
            warning_threshold: 0.8,
            critical_threshold: 0.95,
        },
    );
    limits.insert(
        SERVICE_DB.to_string(),
        UsageLimits {
            requests_daily: 50_000,
            requests_hourly: 5000,
            tokens_daily: 0,
            tokens_hourly: 0,
            warning_threshold: 0.9,
            critical_threshold: 0.98,
        },
    );
    limits
}

/// Time until the next UTC hour boundary.
pub(crate) fn time_until_hour_reset(now: DateTime<Utc>) -> Duration {
    let next = (now + chrono::Duration::hours(1))
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .expect("valid hour boundary");
    (next - now).to_std().unwrap_or_default()
}

/// Time until the next UTC midnight.
pub(crate) fn time_until_day_reset(now: DateTime<Utc>) -> Duration {
    let next_midnight = (now.date_naive() + chrono::Days::new(1))
        .and_hms_opt(0, 0, 0)
        .expect("valid midnight");
    let next = DateTime::<Utc>::from_naive_utc_and_offset(next_midnight, Utc);
    (next - now).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hour_reset_lands_on_the_next_hour_boundary() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 10, 45, 30).unwrap();
        let wait = time_until_hour_reset(now);
        assert_eq!(wait, Duration::from_secs(14 * 60 + 30));
    }

    #[test]
    fn day_reset_lands_on_utc_midnight() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 23, 0, 0).unwrap();
        let wait = time_until_day_reset(now);
        assert_eq!(wait, Duration::from_secs(3600));
    }

    #[test]
    fn default_limits_cover_all_metered_services() {
        let limits = default_service_limits();
        assert!(limits.contains_key(SERVICE_LLM));
        assert!(limits.contains_key(SERVICE_SCRAPER));
        assert!(limits.contains_key(SERVICE_SEARCH));
        assert!(limits.contains_key(SERVICE_DB));
        assert!(limits[SERVICE_LLM].tracks_tokens());
        assert!(!limits[SERVICE_SCRAPER].tracks_tokens());
    }
}
