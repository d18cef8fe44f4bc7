//! The [`JobTransport`] capability.

use std::time::Duration;

use async_trait::async_trait;
use certgen_core::types::{DbId, JobId};

use crate::error::TransportError;
use crate::messages::{BatchRenderRequest, CompletionNotification, JobMeta};

/// Message channel between the orchestrator, the external renderer, and the
/// reconciler.
///
/// Constructed once at process start and shared as `Arc<dyn JobTransport>`.
/// Implementations must honour these ordering rules:
///
/// - [`create_job_meta`](Self::create_job_meta) happens before
///   [`publish`](Self::publish) for the same job, so a consumer that picks
///   up the payload immediately can always find its metadata.
/// - [`pop_completion`](Self::pop_completion) returns `Ok(None)` on
///   timeout, never an error.
#[async_trait]
pub trait JobTransport: Send + Sync {
    /// Initialise bookkeeping (`QUEUED`, zeroed counters) expiring after `ttl`.
    async fn create_job_meta(
        &self,
        job_id: JobId,
        event_id: Option<DbId>,
        total_items: i32,
        ttl: Duration,
    ) -> Result<JobMeta, TransportError>;

    /// Unexpired metadata for a job.
    async fn get_job_meta(&self, job_id: JobId) -> Result<Option<JobMeta>, TransportError>;

    /// Enqueue a batch request on `queue_name`.
    async fn publish(
        &self,
        queue_name: &str,
        request: &BatchRenderRequest,
    ) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the next completion notification.
    async fn pop_completion(
        &self,
        timeout: Duration,
    ) -> Result<Option<CompletionNotification>, TransportError>;

    /// Raw success lines appended by the renderer, in order.
    async fn get_results(&self, job_id: JobId) -> Result<Vec<String>, TransportError>;

    /// Raw failure lines appended by the renderer, in order.
    async fn get_errors(&self, job_id: JobId) -> Result<Vec<String>, TransportError>;

    /// Take the short-lived reconciliation marker for a job.
    ///
    /// Returns `false` if another reconciliation holds it.
    async fn try_lock_job(&self, job_id: JobId, ttl: Duration) -> Result<bool, TransportError>;

    /// Give the marker back early (after a failed reconciliation).
    async fn unlock_job(&self, job_id: JobId) -> Result<(), TransportError>;

    /// Record that the job's results are committed; metadata then expires
    /// through its TTL.
    async fn mark_drained(&self, job_id: JobId) -> Result<(), TransportError>;
}
