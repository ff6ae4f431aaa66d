/// Capture jobs and their lifecycle transitions
///
/// Jobs move `pending -> running -> {completed, failed}`. Every transition
/// is a single conditional UPDATE keyed on the current status, so duplicate
/// callbacks and racing workers resolve inside Postgres: whoever matched
/// the row wins, everyone else gets zero rows and treats the call as a
/// no-op. Terminal states never change; a retry is a new job referencing
/// the original through `retry_of`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Lifecycle state of a capture job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether the job can no longer change state
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Output image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
    Pdf,
}

/// Requested capture options, stored as JSONB on the job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    /// Viewport width in pixels
    pub width: u32,

    /// Viewport height in pixels
    pub height: u32,

    /// Output format
    pub format: ImageFormat,

    /// Capture the full scrollable page rather than the viewport
    pub full_page: bool,

    /// JPEG/WebP quality, 1-100 (ignored for PNG and PDF)
    pub quality: u8,

    /// Delay before capture, for pages that animate in
    pub delay_ms: u32,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
            format: ImageFormat::default(),
            full_page: false,
            quality: 80,
            delay_ms: 0,
        }
    }
}

/// Minimum accepted viewport width
pub const MIN_WIDTH: u32 = 320;

/// Minimum accepted viewport height
pub const MIN_HEIGHT: u32 = 240;

/// Maximum pre-capture delay
pub const MAX_DELAY_MS: u32 = 10_000;

impl CaptureOptions {
    /// Validates options against the caller's plan ceiling
    ///
    /// Out-of-range dimensions are rejected, never clamped: a request for
    /// 7680px on a plan capped at 1920px gets a 400 naming the limit, not a
    /// silently smaller image.
    pub fn validate(&self, max_width: u32, max_height: u32) -> Result<(), String> {
        if self.width < MIN_WIDTH {
            return Err(format!("width must be at least {MIN_WIDTH}px"));
        }
        if self.height < MIN_HEIGHT {
            return Err(format!("height must be at least {MIN_HEIGHT}px"));
        }
        if self.width > max_width {
            return Err(format!("width exceeds plan maximum of {max_width}px"));
        }
        if self.height > max_height {
            return Err(format!("height exceeds plan maximum of {max_height}px"));
        }
        if self.quality == 0 || self.quality > 100 {
            return Err("quality must be between 1 and 100".to_string());
        }
        if self.delay_ms > MAX_DELAY_MS {
            return Err(format!("delay_ms must be at most {MAX_DELAY_MS}"));
        }
        Ok(())
    }
}

/// Result handed back by the capture engine on success
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    /// Opaque storage locator for the stored image
    pub storage_key: String,

    /// Size of the stored image in bytes
    pub result_bytes: i64,

    /// Wall-clock capture duration
    pub duration_ms: i64,
}

/// A capture job row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScreenshotJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub url: String,
    pub options: serde_json::Value,
    pub status: JobStatus,
    pub storage_key: Option<String>,
    pub result_bytes: Option<i64>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub webhook_url: Option<String>,
    #[serde(skip_serializing)]
    pub notified_at: Option<DateTime<Utc>>,
    pub retry_of: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScreenshotJob {
    /// Parses the stored options back into their typed form
    pub fn capture_options(&self) -> Result<CaptureOptions, serde_json::Error> {
        serde_json::from_value(self.options.clone())
    }

    /// Creates a job in `pending`
    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        url: &str,
        options: &CaptureOptions,
        webhook_url: Option<&str>,
        retry_of: Option<Uuid>,
    ) -> Result<Self, sqlx::Error> {
        let options_json =
            serde_json::to_value(options).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        sqlx::query_as::<_, ScreenshotJob>(
            r#"
            INSERT INTO screenshot_jobs (user_id, url, options, webhook_url, retry_of)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, url, options, status, storage_key, result_bytes,
                      duration_ms, error_message, webhook_url, notified_at, retry_of,
                      started_at, ended_at, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(url)
        .bind(options_json)
        .bind(webhook_url)
        .bind(retry_of)
        .fetch_one(pool)
        .await
    }

    /// Claims the oldest pending job for execution
    ///
    /// `FOR UPDATE SKIP LOCKED` lets concurrent workers claim disjoint jobs
    /// without blocking each other; the claimed job moves to `running` with
    /// `started_at` set before the row lock is released.
    pub async fn claim_next(pool: &PgPool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ScreenshotJob>(
            r#"
            UPDATE screenshot_jobs
            SET status = 'running', started_at = NOW(), updated_at = NOW()
            WHERE id = (
                SELECT id FROM screenshot_jobs
                WHERE status = 'pending'
                ORDER BY created_at
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, user_id, url, options, status, storage_key, result_bytes,
                      duration_ms, error_message, webhook_url, notified_at, retry_of,
                      started_at, ended_at, created_at, updated_at
            "#,
        )
        .fetch_optional(pool)
        .await
    }

    /// Transitions `running -> completed`
    ///
    /// Returns the updated job, or `None` if the job was no longer running
    /// (duplicate callback, or reaped by the timeout sweep first).
    pub async fn complete(
        pool: &PgPool,
        job_id: Uuid,
        outcome: &CaptureOutcome,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ScreenshotJob>(
            r#"
            UPDATE screenshot_jobs
            SET status = 'completed', storage_key = $2, result_bytes = $3,
                duration_ms = $4, ended_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'running'
            RETURNING id, user_id, url, options, status, storage_key, result_bytes,
                      duration_ms, error_message, webhook_url, notified_at, retry_of,
                      started_at, ended_at, created_at, updated_at
            "#,
        )
        .bind(job_id)
        .bind(&outcome.storage_key)
        .bind(outcome.result_bytes)
        .bind(outcome.duration_ms)
        .fetch_optional(pool)
        .await
    }

    /// Transitions `running -> failed`
    ///
    /// Idempotent against duplicate callbacks: a job already terminal keeps
    /// its first recorded error and the call returns `None`.
    pub async fn fail(
        pool: &PgPool,
        job_id: Uuid,
        error_message: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ScreenshotJob>(
            r#"
            UPDATE screenshot_jobs
            SET status = 'failed', error_message = $2, ended_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'running'
            RETURNING id, user_id, url, options, status, storage_key, result_bytes,
                      duration_ms, error_message, webhook_url, notified_at, retry_of,
                      started_at, ended_at, created_at, updated_at
            "#,
        )
        .bind(job_id)
        .bind(error_message)
        .fetch_optional(pool)
        .await
    }

    /// Fails every job that has been running longer than `max_runtime_seconds`
    ///
    /// The sweep catches workers that died mid-capture; consumed quota is
    /// not returned, the attempt used its slot.
    pub async fn reap_stuck(
        pool: &PgPool,
        max_runtime_seconds: i64,
        error_message: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ScreenshotJob>(
            r#"
            UPDATE screenshot_jobs
            SET status = 'failed', error_message = $2, ended_at = NOW(), updated_at = NOW()
            WHERE status = 'running'
              AND started_at < NOW() - make_interval(secs => $1::double precision)
            RETURNING id, user_id, url, options, status, storage_key, result_bytes,
                      duration_ms, error_message, webhook_url, notified_at, retry_of,
                      started_at, ended_at, created_at, updated_at
            "#,
        )
        .bind(max_runtime_seconds)
        .bind(error_message)
        .fetch_all(pool)
        .await
    }

    /// Marks the webhook as delivered, exactly once
    ///
    /// Returns `true` only for the caller that flipped `notified_at` from
    /// NULL; every other attempt sees `false` and skips delivery.
    pub async fn mark_notified(pool: &PgPool, job_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE screenshot_jobs
            SET notified_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND notified_at IS NULL
            "#,
        )
        .bind(job_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Fetches a job scoped to its owner
    ///
    /// A job belonging to another user is indistinguishable from a missing
    /// one.
    pub async fn find_for_user(
        pool: &PgPool,
        job_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ScreenshotJob>(
            r#"
            SELECT id, user_id, url, options, status, storage_key, result_bytes,
                   duration_ms, error_message, webhook_url, notified_at, retry_of,
                   started_at, ended_at, created_at, updated_at
            FROM screenshot_jobs
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(job_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Lists a user's jobs, newest first, with offset pagination
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ScreenshotJob>(
            r#"
            SELECT id, user_id, url, options, status, storage_key, result_bytes,
                   duration_ms, error_message, webhook_url, notified_at, retry_of,
                   started_at, ended_at, created_at, updated_at
            FROM screenshot_jobs
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// Counts a user's jobs, for pagination metadata
    pub async fn count_for_user(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM screenshot_jobs WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(pool)
                .await?;
        Ok(count)
    }

    /// Deletes a job scoped to its owner
    ///
    /// Pending jobs are fair game, the claim query will never see them
    /// again. A running job cannot be deleted out from under its worker;
    /// returns `false` when nothing matched.
    pub async fn delete_for_user(
        pool: &PgPool,
        job_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM screenshot_jobs
            WHERE id = $1 AND user_id = $2 AND status <> 'running'
            "#,
        )
        .bind(job_id)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = CaptureOptions::default();
        assert_eq!(opts.width, 1280);
        assert_eq!(opts.height, 800);
        assert_eq!(opts.format, ImageFormat::Png);
        assert!(!opts.full_page);
    }

    #[test]
    fn test_options_validate_below_minimum() {
        let opts = CaptureOptions {
            width: 100,
            ..Default::default()
        };
        let err = opts.validate(1920, 1080).unwrap_err();
        assert!(err.contains("at least"));
    }

    #[test]
    fn test_options_validate_over_plan_ceiling() {
        let opts = CaptureOptions {
            width: 7680,
            ..Default::default()
        };
        let err = opts.validate(1920, 1080).unwrap_err();
        assert!(err.contains("plan maximum"));
    }

    #[test]
    fn test_options_validate_quality_range() {
        let opts = CaptureOptions {
            quality: 0,
            ..Default::default()
        };
        assert!(opts.validate(1920, 1080).is_err());

        let opts = CaptureOptions {
            quality: 101,
            ..Default::default()
        };
        assert!(opts.validate(1920, 1080).is_err());
    }

    #[test]
    fn test_options_roundtrip_json() {
        let opts = CaptureOptions {
            width: 1920,
            height: 1080,
            format: ImageFormat::Jpeg,
            full_page: true,
            quality: 90,
            delay_ms: 250,
        };
        let value = serde_json::to_value(&opts).unwrap();
        assert_eq!(value["format"], "jpeg");
        let back: CaptureOptions = serde_json::from_value(value).unwrap();
        assert_eq!(back.width, 1920);
        assert!(back.full_page);
    }

    #[test]
    fn test_options_partial_json_uses_defaults() {
        let back: CaptureOptions = serde_json::from_value(serde_json::json!({
            "width": 1440
        }))
        .unwrap();
        assert_eq!(back.width, 1440);
        assert_eq!(back.height, 800);
        assert_eq!(back.format, ImageFormat::Png);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }
}
