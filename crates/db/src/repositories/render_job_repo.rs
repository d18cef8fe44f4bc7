//! Repository for the Postgres job transport tables.
//!
//! `render_jobs` holds TTL'd job metadata, `render_queue` the published
//! batch requests, `render_job_items` the renderer's appended result and
//! error lines, `render_completions` the "batch done" notifications, and
//! `render_job_locks` the reconciliation idempotency markers.

use sqlx::PgPool;
use certgen_core::types::{DbId, JobId};

use crate::models::render_job::{RenderCompletionRow, RenderJobRow, RenderQueueEntry};

/// Column list for `render_jobs` queries.
const COLUMNS: &str = "\
    job_id, event_id, job_type, total_items, processed_items, failed_items, \
    status, created_at, expires_at, drained_at";

/// NOTIFY channel raised whenever a completion row is pushed.
pub const COMPLETION_CHANNEL: &str = "certgen_render_completions";

pub struct RenderJobRepo;

impl RenderJobRepo {
    /// Create job metadata in `QUEUED` with zeroed counters.
    pub async fn create_meta(
        pool: &PgPool,
        job_id: JobId,
        event_id: Option<DbId>,
        job_type: &str,
        total_items: i32,
        ttl_secs: i64,
    ) -> Result<RenderJobRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO render_jobs (job_id, event_id, job_type, total_items, expires_at) \
             VALUES ($1, $2, $3, $4, NOW() + make_interval(secs => $5)) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RenderJobRow>(&query)
            .bind(job_id)
            .bind(event_id)
            .bind(job_type)
            .bind(total_items)
            .bind(ttl_secs as f64)
            .fetch_one(pool)
            .await
    }

    /// Find unexpired job metadata.
    pub async fn find_meta(pool: &PgPool, job_id: JobId) -> Result<Option<RenderJobRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM render_jobs WHERE job_id = $1 AND expires_at > NOW()"
        );
        sqlx::query_as::<_, RenderJobRow>(&query)
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    /// Overwrite the overall job status.
    pub async fn set_status(pool: &PgPool, job_id: JobId, status: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE render_jobs SET status = $2 WHERE job_id = $1")
            .bind(job_id)
            .bind(status)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark metadata as reconciled. The row then lives out its TTL.
    pub async fn mark_drained(pool: &PgPool, job_id: JobId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE render_jobs SET drained_at = NOW() WHERE job_id = $1")
            .bind(job_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Delete metadata (and, by cascade, queue rows and items) past its TTL.
    pub async fn purge_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM render_jobs WHERE expires_at <= NOW()")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Append a published batch request to a queue.
    ///
    /// The foreign key to `render_jobs` enforces meta-before-payload.
    pub async fn enqueue(
        pool: &PgPool,
        queue_name: &str,
        job_id: JobId,
        payload: &serde_json::Value,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "INSERT INTO render_queue (queue_name, job_id, payload) VALUES ($1, $2, $3) \
             RETURNING id",
        )
        .bind(queue_name)
        .bind(job_id)
        .bind(payload)
        .fetch_one(pool)
        .await
    }

    /// Atomically claim the oldest unclaimed entry of a queue.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent renderer
    /// instances never receive the same batch.
    pub async fn claim_next(
        pool: &PgPool,
        queue_name: &str,
    ) -> Result<Option<RenderQueueEntry>, sqlx::Error> {
        sqlx::query_as::<_, RenderQueueEntry>(
            "UPDATE render_queue SET claimed_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM render_queue \
                 WHERE queue_name = $1 AND claimed_at IS NULL \
                 ORDER BY id \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING id, queue_name, job_id, payload, enqueued_at, claimed_at",
        )
        .bind(queue_name)
        .fetch_optional(pool)
        .await
    }

    /// Append one raw result or error line and bump the matching counter.
    pub async fn append_item(
        pool: &PgPool,
        job_id: JobId,
        kind: &str,
        line: &str,
        failed: bool,
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("INSERT INTO render_job_items (job_id, kind, line) VALUES ($1, $2, $3)")
            .bind(job_id)
            .bind(kind)
            .bind(line)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE render_jobs \
             SET processed_items = processed_items + 1, \
                 failed_items = failed_items + CASE WHEN $2 THEN 1 ELSE 0 END \
             WHERE job_id = $1",
        )
        .bind(job_id)
        .bind(failed)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Raw lines of one kind, in append order.
    pub async fn list_items(pool: &PgPool, job_id: JobId, kind: &str) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT line FROM render_job_items WHERE job_id = $1 AND kind = $2 ORDER BY id",
        )
        .bind(job_id)
        .bind(kind)
        .fetch_all(pool)
        .await
    }

    /// Push a completion notification and wake listeners.
    pub async fn push_completion(
        pool: &PgPool,
        job_id: JobId,
        payload: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("INSERT INTO render_completions (job_id, payload) VALUES ($1, $2)")
            .bind(job_id)
            .bind(payload)
            .execute(&mut *tx)
            .await?;

        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(COMPLETION_CHANNEL)
            .bind(job_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Remove and return the oldest completion notification, if any.
    pub async fn pop_completion(pool: &PgPool) -> Result<Option<RenderCompletionRow>, sqlx::Error> {
        sqlx::query_as::<_, RenderCompletionRow>(
            "DELETE FROM render_completions \
             WHERE id = ( \
                 SELECT id FROM render_completions \
                 ORDER BY id \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING id, job_id, payload",
        )
        .fetch_optional(pool)
        .await
    }

    /// Try to take the reconciliation marker for a job.
    ///
    /// Succeeds when no marker exists or the previous one has lapsed.
    pub async fn try_lock(pool: &PgPool, job_id: JobId, ttl_secs: i64) -> Result<bool, sqlx::Error> {
        let acquired = sqlx::query_scalar::<_, JobId>(
            "INSERT INTO render_job_locks (job_id, locked_until) \
             VALUES ($1, NOW() + make_interval(secs => $2)) \
             ON CONFLICT (job_id) DO UPDATE SET locked_until = EXCLUDED.locked_until \
             WHERE render_job_locks.locked_until <= NOW() \
             RETURNING job_id",
        )
        .bind(job_id)
        .bind(ttl_secs as f64)
        .fetch_optional(pool)
        .await?;
        Ok(acquired.is_some())
    }

    /// Drop the reconciliation marker so the job can be retried immediately.
    pub async fn release_lock(pool: &PgPool, job_id: JobId) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM render_job_locks WHERE job_id = $1")
            .bind(job_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
