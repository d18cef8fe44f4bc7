//! Postgres-backed [`JobTransport`].
//!
//! Lives in the application database but in its own tables; nothing here
//! is joined against `documents`. The renderer-facing half (claim, append,
//! complete) is exposed as inherent methods for renderer adapters and tests.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio::time::Instant;
use certgen_core::types::{DbId, JobId};
use certgen_db::models::render_job::{RenderJobRow, ITEM_KIND_ERROR, ITEM_KIND_RESULT};
use certgen_db::repositories::render_job_repo::COMPLETION_CHANNEL;
use certgen_db::repositories::RenderJobRepo;

use crate::error::TransportError;
use crate::messages::{
    BatchRenderRequest, CompletionNotification, JobMeta, JobState, JOB_TYPE_GENERATE_DOCS,
};
use crate::transport::JobTransport;

/// Transport over the `render_*` tables.
pub struct PgJobTransport {
    pool: PgPool,
    /// Lazily connected; reset after a listener error.
    listener: Mutex<Option<PgListener>>,
}

impl PgJobTransport {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            listener: Mutex::new(None),
        }
    }

    // -----------------------------------------------------------------------
    // Renderer side
    // -----------------------------------------------------------------------

    /// Claim the oldest unclaimed batch request on a queue.
    pub async fn claim_next(
        &self,
        queue_name: &str,
    ) -> Result<Option<BatchRenderRequest>, TransportError> {
        let Some(entry) = RenderJobRepo::claim_next(&self.pool, queue_name).await? else {
            return Ok(None);
        };
        RenderJobRepo::set_status(&self.pool, entry.job_id, JobState::Processing.as_str()).await?;
        Ok(Some(serde_json::from_value(entry.payload)?))
    }

    /// Append a raw success line.
    pub async fn append_result(&self, job_id: JobId, line: &str) -> Result<(), TransportError> {
        RenderJobRepo::append_item(&self.pool, job_id, ITEM_KIND_RESULT, line, false).await?;
        Ok(())
    }

    /// Append a raw failure line.
    pub async fn append_error(&self, job_id: JobId, line: &str) -> Result<(), TransportError> {
        RenderJobRepo::append_item(&self.pool, job_id, ITEM_KIND_ERROR, line, true).await?;
        Ok(())
    }

    /// Set the overall status and, when terminal, push the completion signal.
    pub async fn finish(&self, job_id: JobId, status: JobState) -> Result<(), TransportError> {
        if !RenderJobRepo::set_status(&self.pool, job_id, status.as_str()).await? {
            return Err(TransportError::JobNotFound(job_id));
        }
        if status.is_terminal() {
            let meta = RenderJobRepo::find_meta(&self.pool, job_id)
                .await?
                .ok_or(TransportError::JobNotFound(job_id))?;
            let notification = CompletionNotification {
                job_id,
                event_id: meta.event_id,
                job_type: meta.job_type,
                status,
            };
            let payload = serde_json::to_value(&notification)?;
            RenderJobRepo::push_completion(&self.pool, job_id, &payload).await?;
        }
        Ok(())
    }

    /// Delete metadata past its TTL. Returns the number of jobs removed.
    pub async fn purge_expired(&self) -> Result<u64, TransportError> {
        Ok(RenderJobRepo::purge_expired(&self.pool).await?)
    }

    /// Pop completions until one decodes; malformed rows are logged and dropped.
    async fn pop_decoded(&self) -> Result<Option<CompletionNotification>, TransportError> {
        while let Some(row) = RenderJobRepo::pop_completion(&self.pool).await? {
            match serde_json::from_value::<CompletionNotification>(row.payload) {
                Ok(notification) => return Ok(Some(notification)),
                Err(e) => {
                    tracing::warn!(
                        completion_id = row.id,
                        job_id = %row.job_id,
                        error = %e,
                        "Dropping malformed completion notification",
                    );
                }
            }
        }
        Ok(None)
    }
}

fn meta_from_row(row: RenderJobRow) -> Result<JobMeta, TransportError> {
    let status = row
        .status
        .parse::<JobState>()
        .map_err(|e| TransportError::Unavailable(format!("job {}: {e}", row.job_id)))?;
    Ok(JobMeta {
        job_id: row.job_id,
        event_id: row.event_id,
        job_type: row.job_type,
        total_items: row.total_items,
        processed_items: row.processed_items,
        failed_items: row.failed_items,
        status,
        created_at: row.created_at,
        expires_at: row.expires_at,
        drained: row.drained_at.is_some(),
    })
}

fn ttl_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX).max(1)
}

#[async_trait]
impl JobTransport for PgJobTransport {
    async fn create_job_meta(
        &self,
        job_id: JobId,
        event_id: Option<DbId>,
        total_items: i32,
        ttl: Duration,
    ) -> Result<JobMeta, TransportError> {
        let row = RenderJobRepo::create_meta(
            &self.pool,
            job_id,
            event_id,
            JOB_TYPE_GENERATE_DOCS,
            total_items,
            ttl_secs(ttl),
        )
        .await?;
        meta_from_row(row)
    }

    async fn get_job_meta(&self, job_id: JobId) -> Result<Option<JobMeta>, TransportError> {
        RenderJobRepo::find_meta(&self.pool, job_id)
            .await?
            .map(meta_from_row)
            .transpose()
    }

    async fn publish(
        &self,
        queue_name: &str,
        request: &BatchRenderRequest,
    ) -> Result<(), TransportError> {
        let payload = serde_json::to_value(request)?;
        let entry_id =
            RenderJobRepo::enqueue(&self.pool, queue_name, request.job_id, &payload).await?;
        tracing::debug!(
            queue = queue_name,
            job_id = %request.job_id,
            entry_id,
            items = request.items.len(),
            "Batch request enqueued",
        );
        Ok(())
    }

    async fn pop_completion(
        &self,
        timeout: Duration,
    ) -> Result<Option<CompletionNotification>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.listener.lock().await;

        if guard.is_none() {
            let mut listener = PgListener::connect_with(&self.pool).await?;
            listener.listen(COMPLETION_CHANNEL).await?;
            *guard = Some(listener);
        }
        let Some(listener) = guard.as_mut() else {
            return Err(TransportError::Unavailable(
                "completion listener not connected".to_string(),
            ));
        };

        loop {
            if let Some(notification) = self.pop_decoded().await? {
                return Ok(Some(notification));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            match tokio::time::timeout(remaining, listener.recv()).await {
                // Woken by NOTIFY: loop and pop.
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    *guard = None;
                    return Err(e.into());
                }
                Err(_elapsed) => return Ok(None),
            }
        }
    }

    async fn get_results(&self, job_id: JobId) -> Result<Vec<String>, TransportError> {
        Ok(RenderJobRepo::list_items(&self.pool, job_id, ITEM_KIND_RESULT).await?)
    }

    async fn get_errors(&self, job_id: JobId) -> Result<Vec<String>, TransportError> {
        Ok(RenderJobRepo::list_items(&self.pool, job_id, ITEM_KIND_ERROR).await?)
    }

    async fn try_lock_job(&self, job_id: JobId, ttl: Duration) -> Result<bool, TransportError> {
        Ok(RenderJobRepo::try_lock(&self.pool, job_id, ttl_secs(ttl)).await?)
    }

    async fn unlock_job(&self, job_id: JobId) -> Result<(), TransportError> {
        Ok(RenderJobRepo::release_lock(&self.pool, job_id).await?)
    }

    async fn mark_drained(&self, job_id: JobId) -> Result<(), TransportError> {
        Ok(RenderJobRepo::mark_drained(&self.pool, job_id).await?)
    }
}
