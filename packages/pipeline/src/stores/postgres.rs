//! Postgres-backed storage implementation.
//!
//! Runtime queries only; schema ownership (and migrations) live with the
//! deployment. Expected tables:
//!
//! ```sql
//! scraping_jobs (id uuid PK, target_url text, status text, priority int4,
//!                retry_count int4, max_retries int4, scheduled_at timestamptz,
//!                started_at timestamptz, completed_at timestamptz,
//!                collected_data jsonb, errors text[], created_at timestamptz,
//!                updated_at timestamptz)
//! food_trucks   (id uuid PK, name text, source_urls text[],
//!                verification_status text, data_quality_score float8,
//!                data jsonb, created_at timestamptz, updated_at timestamptz)
//! api_usage_daily  (service text, usage_date date, requests_used int8,
//!                   tokens_used int8, PRIMARY KEY (service, usage_date))
//! api_usage_hourly (service text, hour_start timestamptz, requests_used int8,
//!                   tokens_used int8, PRIMARY KEY (service, hour_start))
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::{JobStore, JobUpdate, TruckStore, UsageLedger};
use crate::types::{FoodTruck, JobStatus, ScrapingJob, ServiceUsage};

const JOB_COLUMNS: &str = "id, target_url, status, priority, retry_count, max_retries, \
     scheduled_at, started_at, completed_at, collected_data, errors, created_at, updated_at";

/// Postgres store for jobs, trucks, and usage counters.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn job_from_row(row: &PgRow) -> StoreResult<ScrapingJob> {
    let status: String = row.try_get("status")?;
    Ok(ScrapingJob {
        id: row.try_get("id")?,
        target_url: row.try_get("target_url")?,
        status: status
            .parse::<JobStatus>()
            .map_err(StoreError::Backend)?,
        priority: row.try_get("priority")?,
        retry_count: row.try_get("retry_count")?,
        max_retries: row.try_get("max_retries")?,
        scheduled_at: row.try_get("scheduled_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        collected_data: row.try_get("collected_data")?,
        errors: row.try_get("errors")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn truck_from_row(row: &PgRow) -> StoreResult<FoodTruck> {
    let data: serde_json::Value = row.try_get("data")?;
    Ok(serde_json::from_value(data)?)
}

fn usage_from_row(row: &PgRow) -> StoreResult<ServiceUsage> {
    let requests: i64 = row.try_get("requests_used")?;
    let tokens: i64 = row.try_get("tokens_used")?;
    Ok(ServiceUsage {
        requests_used: requests.max(0) as u64,
        tokens_used: tokens.max(0) as u64,
    })
}

#[async_trait]
impl JobStore for PostgresStore {
    async fn create_job(&self, job: &ScrapingJob) -> StoreResult<ScrapingJob> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO scraping_jobs ({JOB_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {JOB_COLUMNS}
            "#,
        ))
        .bind(job.id)
        .bind(&job.target_url)
        .bind(job.status.as_str())
        .bind(job.priority)
        .bind(job.retry_count)
        .bind(job.max_retries)
        .bind(job.scheduled_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.collected_data)
        .bind(&job.errors)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&self.pool)
        .await?;

        job_from_row(&row)
    }

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<ScrapingJob>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scraping_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn get_jobs_by_status(&self, status: JobStatus) -> StoreResult<Vec<ScrapingJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scraping_jobs WHERE status = $1 ORDER BY created_at"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    async fn claim_next_job(&self) -> StoreResult<Option<ScrapingJob>> {
        // FOR UPDATE SKIP LOCKED keeps concurrent workers from double-claiming.
        let row = sqlx::query(&format!(
            r#"
            WITH next_job AS (
                SELECT id
                FROM scraping_jobs
                WHERE status = 'pending' AND scheduled_at <= NOW()
                ORDER BY priority DESC, scheduled_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE scraping_jobs
            SET status = 'running', started_at = NOW(), updated_at = NOW()
            WHERE id IN (SELECT id FROM next_job)
            RETURNING {JOB_COLUMNS}
            "#,
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        update: JobUpdate,
    ) -> StoreResult<ScrapingJob> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE scraping_jobs
            SET status = $2,
                errors = errors || $3,
                collected_data = COALESCE($4, collected_data),
                completed_at = COALESCE($5, completed_at),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(&update.errors)
        .bind(&update.collected_data)
        .bind(update.completed_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;

        job_from_row(&row)
    }

    async fn increment_retry(&self, id: Uuid) -> StoreResult<ScrapingJob> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE scraping_jobs
            SET retry_count = retry_count + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#,
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;

        job_from_row(&row)
    }

    async fn requeue(&self, id: Uuid, run_at: DateTime<Utc>) -> StoreResult<ScrapingJob> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE scraping_jobs
            SET status = 'pending', scheduled_at = $2, started_at = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(run_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;

        job_from_row(&row)
    }

    async fn requeue_stale_running(&self, older_than: Duration) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE scraping_jobs
            SET status = 'pending', scheduled_at = NOW(), started_at = NULL, updated_at = NOW()
            WHERE status = 'running'
              AND started_at < NOW() - ($1 || ' milliseconds')::INTERVAL
            "#,
        )
        .bind((older_than.as_millis() as i64).to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TruckStore for PostgresStore {
    async fn create_truck(&self, truck: &FoodTruck) -> StoreResult<FoodTruck> {
        let data = serde_json::to_value(truck)?;
        let row = sqlx::query(
            r#"
            INSERT INTO food_trucks
                (id, name, source_urls, verification_status, data_quality_score, data,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING data
            "#,
        )
        .bind(truck.id)
        .bind(&truck.name)
        .bind(&truck.source_urls)
        .bind(truck.verification_status.as_str())
        .bind(truck.data_quality_score)
        .bind(data)
        .bind(truck.created_at)
        .bind(truck.updated_at)
        .fetch_one(&self.pool)
        .await?;

        truck_from_row(&row)
    }

    async fn update_truck(&self, truck: &FoodTruck) -> StoreResult<FoodTruck> {
        let data = serde_json::to_value(truck)?;
        let row = sqlx::query(
            r#"
            UPDATE food_trucks
            SET name = $2, source_urls = $3, verification_status = $4,
                data_quality_score = $5, data = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING data
            "#,
        )
        .bind(truck.id)
        .bind(&truck.name)
        .bind(&truck.source_urls)
        .bind(truck.verification_status.as_str())
        .bind(truck.data_quality_score)
        .bind(data)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            id: truck.id.to_string(),
        })?;

        truck_from_row(&row)
    }

    async fn get_truck(&self, id: Uuid) -> StoreResult<Option<FoodTruck>> {
        let row = sqlx::query("SELECT data FROM food_trucks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(truck_from_row).transpose()
    }

    async fn find_by_name_or_url(
        &self,
        name: &str,
        source_url: &str,
    ) -> StoreResult<Vec<FoodTruck>> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM food_trucks
            WHERE lower(name) = lower($1)
               OR ($2 <> '' AND $2 = ANY(source_urls))
            "#,
        )
        .bind(name)
        .bind(source_url)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(truck_from_row).collect()
    }

    async fn list_trucks(&self) -> StoreResult<Vec<FoodTruck>> {
        let rows = sqlx::query("SELECT data FROM food_trucks ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(truck_from_row).collect()
    }
}

#[async_trait]
impl UsageLedger for PostgresStore {
    async fn get_today_usage(&self, service: &str) -> StoreResult<Option<ServiceUsage>> {
        let row = sqlx::query(
            r#"
            SELECT requests_used, tokens_used
            FROM api_usage_daily
            WHERE service = $1 AND usage_date = (NOW() AT TIME ZONE 'UTC')::date
            "#,
        )
        .bind(service)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| usage_from_row(&row)).transpose()
    }

    async fn get_hour_usage(&self, service: &str) -> StoreResult<Option<ServiceUsage>> {
        let row = sqlx::query(
            r#"
            SELECT requests_used, tokens_used
            FROM api_usage_hourly
            WHERE service = $1 AND hour_start = date_trunc('hour', NOW())
            "#,
        )
        .bind(service)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| usage_from_row(&row)).transpose()
    }

    async fn increment_usage(&self, service: &str, requests: u64, tokens: u64) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO api_usage_daily (service, usage_date, requests_used, tokens_used)
            VALUES ($1, (NOW() AT TIME ZONE 'UTC')::date, $2, $3)
            ON CONFLICT (service, usage_date) DO UPDATE
            SET requests_used = api_usage_daily.requests_used + EXCLUDED.requests_used,
                tokens_used = api_usage_daily.tokens_used + EXCLUDED.tokens_used
            "#,
        )
        .bind(service)
        .bind(requests as i64)
        .bind(tokens as i64)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO api_usage_hourly (service, hour_start, requests_used, tokens_used)
            VALUES ($1, date_trunc('hour', NOW()), $2, $3)
            ON CONFLICT (service, hour_start) DO UPDATE
            SET requests_used = api_usage_hourly.requests_used + EXCLUDED.requests_used,
                tokens_used = api_usage_hourly.tokens_used + EXCLUDED.tokens_used
            "#,
        )
        .bind(service)
        .bind(requests as i64)
        .bind(tokens as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
