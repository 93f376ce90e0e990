//! Fixed-window rate limiter with a block gate.
//!
//! One window per `(limit class, client identity)`. Exceeding the window's
//! budget trips a block that outlives the window; `auth`-class limits are
//! success-exempt so only failed attempts consume quota.
//!
//! The map is process-local and mutex-guarded: a single-instance
//! approximation. Multi-instance deployments need a shared atomic counter
//! store behind the same interface.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Named rate-limit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitClass {
    /// Authentication endpoints: strict, success-exempt
    Auth,
    /// General API endpoints
    Api,
    /// Admin endpoints: very strict
    Admin,
}

impl LimitClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitClass::Auth => "auth",
            LimitClass::Api => "api",
            LimitClass::Admin => "admin",
        }
    }
}

impl std::fmt::Display for LimitClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy parameters for one limit class.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
    pub block_duration: Duration,
    /// Successful requests do not count against the quota; only failures do
    pub skip_successful_requests: bool,
}

impl RateLimitConfig {
    /// Shipped policy for a limit class.
    pub fn for_class(class: LimitClass) -> Self {
        match class {
            LimitClass::Auth => Self {
                window: Duration::from_secs(15 * 60),
                max_requests: 5,
                block_duration: Duration::from_secs(30 * 60),
                skip_successful_requests: true,
            },
            LimitClass::Api => Self {
                window: Duration::from_secs(60),
                max_requests: 60,
                block_duration: Duration::from_secs(5 * 60),
                skip_successful_requests: false,
            },
            LimitClass::Admin => Self {
                window: Duration::from_secs(60),
                max_requests: 20,
                block_duration: Duration::from_secs(15 * 60),
                skip_successful_requests: false,
            },
        }
    }
}

/// Outcome of a rate-limit check. Callers translate `allowed = false` into a
/// 429-equivalent response carrying `retry_after`.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    /// Seconds until the caller may try again, set when denied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Read-only view of an identity's current standing.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Aggregate counters for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStats {
    pub total_entries: usize,
    pub blocked_entries: usize,
    pub entries_by_class: HashMap<String, usize>,
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_reset_at: DateTime<Utc>,
    blocked: bool,
    block_until: Option<DateTime<Utc>>,
}

impl RateLimitEntry {
    fn new(now: DateTime<Utc>, config: &RateLimitConfig) -> Self {
        Self {
            count: 0,
            window_reset_at: now + config.window,
            blocked: false,
            block_until: None,
        }
    }

    fn is_blocked(&self, now: DateTime<Utc>) -> bool {
        self.blocked && self.block_until.is_some_and(|until| now < until)
    }

    fn reset(&mut self, now: DateTime<Utc>, config: &RateLimitConfig) {
        self.count = 0;
        self.window_reset_at = now + config.window;
        self.blocked = false;
        self.block_until = None;
    }

    /// Expired window and no active block: eligible for the sweep.
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_reset_at
            && (!self.blocked || self.block_until.map_or(true, |until| now >= until))
    }
}

/// Fixed-window counter + block gate per `(limit class, client identity)`.
///
/// Never raises; every call returns a decision object.
pub struct RateLimiter {
    entries: Mutex<HashMap<(LimitClass, String), RateLimitEntry>>,
    overrides: HashMap<LimitClass, RateLimitConfig>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            overrides: HashMap::new(),
        }
    }

    /// Override the policy for one class (tests, deployments with custom quotas).
    pub fn with_config(mut self, class: LimitClass, config: RateLimitConfig) -> Self {
        self.overrides.insert(class, config);
        self
    }

    /// Effective policy for a class, including any override.
    pub fn class_config(&self, class: LimitClass) -> RateLimitConfig {
        self.overrides
            .get(&class)
            .copied()
            .unwrap_or_else(|| RateLimitConfig::for_class(class))
    }

    /// Check and consume one request slot for `identity` under `class`.
    pub fn check(&self, identity: &str, class: LimitClass) -> RateLimitDecision {
        self.check_at(identity, class, Utc::now())
    }

    /// Deterministic variant of [`check`](Self::check) used by tests.
    pub fn check_at(
        &self,
        identity: &str,
        class: LimitClass,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let config = self.class_config(class);
        let mut entries = self.entries.lock().expect("rate limit map poisoned");

        // Opportunistic sweep bounds the map between periodic callers.
        entries.retain(|_, entry| !entry.is_expired(now));

        let entry = entries
            .entry((class, identity.to_string()))
            .or_insert_with(|| RateLimitEntry::new(now, &config));

        if entry.is_blocked(now) {
            let until = entry.block_until.expect("blocked entry without block_until");
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: entry.window_reset_at,
                retry_after: Some(seconds_until(now, until)),
            };
        }

        if now >= entry.window_reset_at {
            entry.reset(now, &config);
        }

        if entry.count >= config.max_requests {
            entry.blocked = true;
            entry.block_until = Some(now + config.block_duration);
            tracing::warn!(
                class = %class,
                identity = %identity,
                block_secs = config.block_duration.as_secs(),
                "rate limit exceeded, blocking identity"
            );
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: entry.window_reset_at,
                retry_after: Some(config.block_duration.as_secs()),
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: config.max_requests - entry.count,
            reset_at: entry.window_reset_at,
            retry_after: None,
        }
    }

    /// Record a successful request. For success-exempt classes this resets the
    /// counter (and any block) so only failures consume quota.
    pub fn record_success(&self, identity: &str, class: LimitClass) {
        let config = self.class_config(class);
        if !config.skip_successful_requests {
            return;
        }

        let mut entries = self.entries.lock().expect("rate limit map poisoned");
        if let Some(entry) = entries.get_mut(&(class, identity.to_string())) {
            entry.count = 0;
            entry.blocked = false;
            entry.block_until = None;
        }
    }

    /// Current standing without consuming a slot.
    pub fn status(&self, identity: &str, class: LimitClass) -> RateLimitStatus {
        self.status_at(identity, class, Utc::now())
    }

    pub fn status_at(
        &self,
        identity: &str,
        class: LimitClass,
        now: DateTime<Utc>,
    ) -> RateLimitStatus {
        let config = self.class_config(class);
        let entries = self.entries.lock().expect("rate limit map poisoned");

        let Some(entry) = entries.get(&(class, identity.to_string())) else {
            return RateLimitStatus {
                remaining: config.max_requests,
                reset_at: now + config.window,
                blocked: false,
                retry_after: None,
            };
        };

        if entry.is_blocked(now) {
            let until = entry.block_until.expect("blocked entry without block_until");
            return RateLimitStatus {
                remaining: 0,
                reset_at: entry.window_reset_at,
                blocked: true,
                retry_after: Some(seconds_until(now, until)),
            };
        }

        if now >= entry.window_reset_at {
            return RateLimitStatus {
                remaining: config.max_requests,
                reset_at: now + config.window,
                blocked: false,
                retry_after: None,
            };
        }

        RateLimitStatus {
            remaining: config.max_requests.saturating_sub(entry.count),
            reset_at: entry.window_reset_at,
            blocked: false,
            retry_after: None,
        }
    }

    /// Clear limits for an identity: one class, or all classes.
    pub fn clear(&self, identity: &str, class: Option<LimitClass>) {
        let mut entries = self.entries.lock().expect("rate limit map poisoned");
        match class {
            Some(class) => {
                entries.remove(&(class, identity.to_string()));
            }
            None => {
                entries.retain(|(_, id), _| id != identity);
            }
        }
    }

    /// Aggregate counters for dashboards.
    pub fn stats(&self) -> RateLimitStats {
        let entries = self.entries.lock().expect("rate limit map poisoned");
        let mut entries_by_class: HashMap<String, usize> = HashMap::new();
        let mut blocked_entries = 0;

        for ((class, _), entry) in entries.iter() {
            *entries_by_class.entry(class.as_str().to_string()).or_insert(0) += 1;
            if entry.blocked {
                blocked_entries += 1;
            }
        }

        RateLimitStats {
            total_entries: entries.len(),
            blocked_entries,
            entries_by_class,
        }
    }
}

fn seconds_until(now: DateTime<Utc>, until: DateTime<Utc>) -> u64 {
    let millis = (until - now).num_milliseconds().max(0) as u64;
    millis.div_ceil(1000)
}
