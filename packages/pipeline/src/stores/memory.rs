//! In-memory storage implementation for testing and single-instance deployments.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::{JobStore, JobUpdate, TruckStore, UsageLedger};
use crate::types::{FoodTruck, JobStatus, ScrapingJob, ServiceUsage};

type UsageKey = (String, NaiveDate);
type HourlyKey = (String, NaiveDate, u32);

/// In-memory store for jobs, trucks, and usage counters.
///
/// Data is lost on restart; acceptable for tests and the documented
/// single-instance approximation. Every mutation is atomic under one lock,
/// which is what makes `claim_next_job` safe against double-claiming.
pub struct MemoryStore {
    jobs: Mutex<HashMap<Uuid, ScrapingJob>>,
    trucks: Mutex<HashMap<Uuid, FoodTruck>>,
    daily_usage: Mutex<HashMap<UsageKey, ServiceUsage>>,
    hourly_usage: Mutex<HashMap<HourlyKey, ServiceUsage>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            trucks: Mutex::new(HashMap::new()),
            daily_usage: Mutex::new(HashMap::new()),
            hourly_usage: Mutex::new(HashMap::new()),
        }
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().expect("job map poisoned").len()
    }

    pub fn truck_count(&self) -> usize {
        self.trucks.lock().expect("truck map poisoned").len()
    }

    /// Seed daily usage without touching the hourly bucket (backfills, tests
    /// that model consumption from earlier hours of the day).
    pub async fn backdate_daily_usage(&self, service: &str, requests: u64, tokens: u64) {
        let key = (service.to_string(), Utc::now().date_naive());
        let mut daily = self.daily_usage.lock().expect("usage map poisoned");
        let entry = daily.entry(key).or_default();
        entry.requests_used += requests;
        entry.tokens_used += tokens;
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, job: &ScrapingJob) -> StoreResult<ScrapingJob> {
        let mut jobs = self.jobs.lock().expect("job map poisoned");
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(job.clone())
    }

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<ScrapingJob>> {
        Ok(self.jobs.lock().expect("job map poisoned").get(&id).cloned())
    }

    async fn get_jobs_by_status(&self, status: JobStatus) -> StoreResult<Vec<ScrapingJob>> {
        let mut jobs: Vec<ScrapingJob> = self
            .jobs
            .lock()
            .expect("job map poisoned")
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    async fn claim_next_job(&self) -> StoreResult<Option<ScrapingJob>> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().expect("job map poisoned");

        let next_id = jobs
            .values()
            .filter(|job| job.is_ready(now))
            .min_by_key(|job| (std::cmp::Reverse(job.priority), job.scheduled_at))
            .map(|job| job.id);

        let Some(id) = next_id else {
            return Ok(None);
        };

        let job = jobs.get_mut(&id).expect("claimed job vanished");
        job.status = JobStatus::Running;
        job.started_at = Some(now);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        update: JobUpdate,
    ) -> StoreResult<ScrapingJob> {
        let mut jobs = self.jobs.lock().expect("job map poisoned");
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;

        job.status = status;
        job.errors.extend(update.errors);
        if let Some(data) = update.collected_data {
            job.collected_data = Some(data);
        }
        if let Some(completed_at) = update.completed_at {
            job.completed_at = Some(completed_at);
        }
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn increment_retry(&self, id: Uuid) -> StoreResult<ScrapingJob> {
        let mut jobs = self.jobs.lock().expect("job map poisoned");
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        job.retry_count += 1;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn requeue(&self, id: Uuid, run_at: DateTime<Utc>) -> StoreResult<ScrapingJob> {
        let mut jobs = self.jobs.lock().expect("job map poisoned");
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        job.status = JobStatus::Pending;
        job.scheduled_at = run_at;
        job.started_at = None;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn requeue_stale_running(&self, older_than: Duration) -> StoreResult<u64> {
        let now = Utc::now();
        let cutoff = now
            - chrono::Duration::from_std(older_than)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut jobs = self.jobs.lock().expect("job map poisoned");
        let mut requeued = 0;

        for job in jobs.values_mut() {
            let stale = job.status == JobStatus::Running
                && job.started_at.is_some_and(|started| started < cutoff);
            if stale {
                job.status = JobStatus::Pending;
                job.scheduled_at = now;
                job.started_at = None;
                job.updated_at = now;
                requeued += 1;
            }
        }

        Ok(requeued)
    }
}

#[async_trait]
impl TruckStore for MemoryStore {
    async fn create_truck(&self, truck: &FoodTruck) -> StoreResult<FoodTruck> {
        let mut trucks = self.trucks.lock().expect("truck map poisoned");
        if trucks.contains_key(&truck.id) {
            return Err(StoreError::Conflict(format!(
                "truck {} already exists",
                truck.id
            )));
        }
        trucks.insert(truck.id, truck.clone());
        Ok(truck.clone())
    }

    async fn update_truck(&self, truck: &FoodTruck) -> StoreResult<FoodTruck> {
        let mut trucks = self.trucks.lock().expect("truck map poisoned");
        let existing = trucks
            .get_mut(&truck.id)
            .ok_or_else(|| StoreError::NotFound {
                id: truck.id.to_string(),
            })?;
        *existing = truck.clone();
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }

    async fn get_truck(&self, id: Uuid) -> StoreResult<Option<FoodTruck>> {
        Ok(self
            .trucks
            .lock()
            .expect("truck map poisoned")
            .get(&id)
            .cloned())
    }

    async fn find_by_name_or_url(
        &self,
        name: &str,
        source_url: &str,
    ) -> StoreResult<Vec<FoodTruck>> {
        let trucks = self.trucks.lock().expect("truck map poisoned");
        Ok(trucks
            .values()
            .filter(|truck| {
                truck.name.eq_ignore_ascii_case(name)
                    || (!source_url.is_empty()
                        && truck.source_urls.iter().any(|url| url == source_url))
            })
            .cloned()
            .collect())
    }

    async fn list_trucks(&self) -> StoreResult<Vec<FoodTruck>> {
        let mut trucks: Vec<FoodTruck> = self
            .trucks
            .lock()
            .expect("truck map poisoned")
            .values()
            .cloned()
            .collect();
        trucks.sort_by_key(|truck| truck.created_at);
        Ok(trucks)
    }
}

#[async_trait]
impl UsageLedger for MemoryStore {
    async fn get_today_usage(&self, service: &str) -> StoreResult<Option<ServiceUsage>> {
        let key = (service.to_string(), Utc::now().date_naive());
        Ok(self
            .daily_usage
            .lock()
            .expect("usage map poisoned")
            .get(&key)
            .copied())
    }

    async fn get_hour_usage(&self, service: &str) -> StoreResult<Option<ServiceUsage>> {
        let now = Utc::now();
        let key = (service.to_string(), now.date_naive(), now.hour());
        Ok(self
            .hourly_usage
            .lock()
            .expect("usage map poisoned")
            .get(&key)
            .copied())
    }

    async fn increment_usage(&self, service: &str, requests: u64, tokens: u64) -> StoreResult<()> {
        let now = Utc::now();

        {
            let key = (service.to_string(), now.date_naive());
            let mut daily = self.daily_usage.lock().expect("usage map poisoned");
            let entry = daily.entry(key).or_default();
            entry.requests_used += requests;
            entry.tokens_used += tokens;
        }

        let key = (service.to_string(), now.date_naive(), now.hour());
        let mut hourly = self.hourly_usage.lock().expect("usage map poisoned");
        let entry = hourly.entry(key).or_default();
        entry.requests_used += requests;
        entry.tokens_used += tokens;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExtractedTruck;

    fn truck(name: &str, source_url: &str) -> FoodTruck {
        FoodTruck::from_extracted(
            ExtractedTruck {
                name: name.to_string(),
                ..Default::default()
            },
            source_url,
        )
    }

    #[tokio::test]
    async fn claim_prefers_priority_then_oldest_schedule() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let mut low = ScrapingJob::new("https://low.example");
        low.scheduled_at = now - chrono::Duration::seconds(30);
        let high = ScrapingJob::new("https://high.example").with_priority(5);
        store.create_job(&low).await.unwrap();
        store.create_job(&high).await.unwrap();

        let claimed = store.claim_next_job().await.unwrap().unwrap();
        assert_eq!(claimed.target_url, "https://high.example");
        assert_eq!(claimed.status, JobStatus::Running);
        assert!(claimed.started_at.is_some());
    }

    #[tokio::test]
    async fn claim_skips_deferred_jobs() {
        let store = MemoryStore::new();
        let mut job = ScrapingJob::new("https://example.com");
        job.scheduled_at = Utc::now() + chrono::Duration::seconds(60);
        store.create_job(&job).await.unwrap();

        assert!(store.claim_next_job().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claimed_job_cannot_be_claimed_again() {
        let store = MemoryStore::new();
        store
            .create_job(&ScrapingJob::new("https://example.com"))
            .await
            .unwrap();

        assert!(store.claim_next_job().await.unwrap().is_some());
        assert!(store.claim_next_job().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_status_appends_errors() {
        let store = MemoryStore::new();
        let job = ScrapingJob::new("https://example.com");
        store.create_job(&job).await.unwrap();

        store
            .update_status(job.id, JobStatus::Failed, JobUpdate::error("first"))
            .await
            .unwrap();
        let updated = store
            .update_status(job.id, JobStatus::Failed, JobUpdate::error("second"))
            .await
            .unwrap();

        assert_eq!(updated.errors, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn requeue_resets_to_pending_with_new_schedule() {
        let store = MemoryStore::new();
        let job = ScrapingJob::new("https://example.com");
        store.create_job(&job).await.unwrap();
        store.claim_next_job().await.unwrap().unwrap();

        let run_at = Utc::now() + chrono::Duration::seconds(5);
        let requeued = store.requeue(job.id, run_at).await.unwrap();
        assert_eq!(requeued.status, JobStatus::Pending);
        assert_eq!(requeued.scheduled_at, run_at);
        assert!(requeued.started_at.is_none());
    }

    #[tokio::test]
    async fn stale_running_jobs_are_requeued() {
        let store = MemoryStore::new();
        let job = ScrapingJob::new("https://example.com");
        store.create_job(&job).await.unwrap();
        let mut claimed = store.claim_next_job().await.unwrap().unwrap();

        // Simulate an attempt that started an hour ago.
        claimed.started_at = Some(Utc::now() - chrono::Duration::hours(1));
        store
            .jobs
            .lock()
            .unwrap()
            .insert(claimed.id, claimed.clone());

        let requeued = store
            .requeue_stale_running(Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(requeued, 1);
        assert_eq!(
            store.get_job(job.id).await.unwrap().unwrap().status,
            JobStatus::Pending
        );
    }

    #[tokio::test]
    async fn fresh_running_jobs_are_not_reaped() {
        let store = MemoryStore::new();
        store
            .create_job(&ScrapingJob::new("https://example.com"))
            .await
            .unwrap();
        store.claim_next_job().await.unwrap();

        let requeued = store
            .requeue_stale_running(Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(requeued, 0);
    }

    #[tokio::test]
    async fn find_matches_name_case_insensitively_and_by_url() {
        let store = MemoryStore::new();
        store
            .create_truck(&truck("Taco Supreme", "https://example-truck.com"))
            .await
            .unwrap();

        let by_name = store
            .find_by_name_or_url("TACO SUPREME", "https://other.example")
            .await
            .unwrap();
        assert_eq!(by_name.len(), 1);

        let by_url = store
            .find_by_name_or_url("Different Name", "https://example-truck.com")
            .await
            .unwrap();
        assert_eq!(by_url.len(), 1);

        let neither = store
            .find_by_name_or_url("Different Name", "https://other.example")
            .await
            .unwrap();
        assert!(neither.is_empty());
    }

    #[tokio::test]
    async fn usage_increments_both_windows() {
        let store = MemoryStore::new();
        store.increment_usage("llm", 2, 300).await.unwrap();
        store.increment_usage("llm", 1, 100).await.unwrap();

        let today = store.get_today_usage("llm").await.unwrap().unwrap();
        assert_eq!(today.requests_used, 3);
        assert_eq!(today.tokens_used, 400);

        let hour = store.get_hour_usage("llm").await.unwrap().unwrap();
        assert!(hour.requests_used <= 3);
        assert!(hour.requests_used >= 1);
    }

    #[tokio::test]
    async fn unknown_service_has_no_usage() {
        let store = MemoryStore::new();
        assert!(store.get_today_usage("llm").await.unwrap().is_none());
    }
}
