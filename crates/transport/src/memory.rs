//! In-memory [`JobTransport`] for tests and single-process development.
//!
//! Not suitable for production: nothing is shared across processes and all
//! state is lost on exit. The renderer-facing helpers let tests play the
//! part of the external renderer.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use certgen_core::types::{DbId, JobId, Timestamp};

use crate::error::TransportError;
use crate::messages::{
    BatchRenderRequest, CompletionNotification, JobMeta, JobState, JOB_TYPE_GENERATE_DOCS,
};
use crate::transport::JobTransport;

#[derive(Default)]
struct State {
    jobs: HashMap<JobId, JobMeta>,
    queues: HashMap<String, VecDeque<BatchRenderRequest>>,
    /// Every request ever published, for inspection.
    published: Vec<(String, BatchRenderRequest)>,
    results: HashMap<JobId, Vec<String>>,
    errors: HashMap<JobId, Vec<String>>,
    completions: VecDeque<CompletionNotification>,
    locks: HashMap<JobId, Timestamp>,
}

impl State {
    fn live_job(&self, job_id: JobId) -> Option<&JobMeta> {
        self.jobs.get(&job_id).filter(|m| m.expires_at > Utc::now())
    }

    fn live_job_mut(&mut self, job_id: JobId) -> Result<&mut JobMeta, TransportError> {
        self.jobs
            .get_mut(&job_id)
            .filter(|m| m.expires_at > Utc::now())
            .ok_or(TransportError::JobNotFound(job_id))
    }
}

/// Single-process transport backed by a mutex-guarded map.
#[derive(Default)]
pub struct InMemoryJobTransport {
    state: Mutex<State>,
    completion_ready: Notify,
    fail_publish: AtomicBool,
    fail_reads: AtomicBool,
}

/// TTLs beyond a century are clamped so timestamp arithmetic cannot overflow.
fn chrono_ttl(ttl: Duration) -> chrono::Duration {
    let cap = chrono::Duration::days(36_500);
    chrono::Duration::from_std(ttl).map_or(cap, |d| d.min(cap))
}

impl InMemoryJobTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `publish` fail with `Unavailable`.
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent meta/result read fail with `Unavailable`.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_reads(&self) -> Result<(), TransportError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("reads disabled".to_string()));
        }
        Ok(())
    }

    /// Every request published so far, oldest first.
    pub async fn published(&self) -> Vec<(String, BatchRenderRequest)> {
        self.state.lock().await.published.clone()
    }

    // -----------------------------------------------------------------------
    // Renderer side
    // -----------------------------------------------------------------------

    /// Take the oldest request from a queue and mark its job `PROCESSING`.
    pub async fn claim_next(&self, queue_name: &str) -> Option<BatchRenderRequest> {
        let mut state = self.state.lock().await;
        let request = state.queues.get_mut(queue_name)?.pop_front()?;
        if let Ok(meta) = state.live_job_mut(request.job_id) {
            meta.status = JobState::Processing;
        }
        Some(request)
    }

    pub async fn append_result(&self, job_id: JobId, line: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.results.entry(job_id).or_default().push(line.into());
        if let Ok(meta) = state.live_job_mut(job_id) {
            meta.processed_items += 1;
        }
    }

    pub async fn append_error(&self, job_id: JobId, line: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.errors.entry(job_id).or_default().push(line.into());
        if let Ok(meta) = state.live_job_mut(job_id) {
            meta.processed_items += 1;
            meta.failed_items += 1;
        }
    }

    /// Set the overall status without notifying anyone.
    pub async fn set_status(&self, job_id: JobId, status: JobState) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.live_job_mut(job_id)?.status = status;
        Ok(())
    }

    /// Push a notification as-is, duplicates included.
    pub async fn push_completion(&self, notification: CompletionNotification) {
        self.state.lock().await.completions.push_back(notification);
        self.completion_ready.notify_one();
    }

    /// Set a terminal status and push the matching notification.
    pub async fn finish(&self, job_id: JobId, status: JobState) -> Result<(), TransportError> {
        let notification = {
            let mut state = self.state.lock().await;
            let meta = state.live_job_mut(job_id)?;
            meta.status = status;
            CompletionNotification {
                job_id,
                event_id: meta.event_id,
                job_type: meta.job_type.clone(),
                status,
            }
        };
        self.push_completion(notification).await;
        Ok(())
    }

    /// Force a job's metadata past its TTL.
    pub async fn expire_job(&self, job_id: JobId) {
        if let Some(meta) = self.state.lock().await.jobs.get_mut(&job_id) {
            meta.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }

    /// Whether a reconciliation marker is currently held.
    pub async fn is_locked(&self, job_id: JobId) -> bool {
        self.state
            .lock()
            .await
            .locks
            .get(&job_id)
            .is_some_and(|until| *until > Utc::now())
    }
}

#[async_trait]
impl JobTransport for InMemoryJobTransport {
    async fn create_job_meta(
        &self,
        job_id: JobId,
        event_id: Option<DbId>,
        total_items: i32,
        ttl: Duration,
    ) -> Result<JobMeta, TransportError> {
        let now = Utc::now();
        let meta = JobMeta {
            job_id,
            event_id,
            job_type: JOB_TYPE_GENERATE_DOCS.to_string(),
            total_items,
            processed_items: 0,
            failed_items: 0,
            status: JobState::Queued,
            created_at: now,
            expires_at: now + chrono_ttl(ttl),
            drained: false,
        };
        self.state.lock().await.jobs.insert(job_id, meta.clone());
        Ok(meta)
    }

    async fn get_job_meta(&self, job_id: JobId) -> Result<Option<JobMeta>, TransportError> {
        self.check_reads()?;
        Ok(self.state.lock().await.live_job(job_id).cloned())
    }

    async fn publish(
        &self,
        queue_name: &str,
        request: &BatchRenderRequest,
    ) -> Result<(), TransportError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("publish disabled".to_string()));
        }
        let mut state = self.state.lock().await;
        if state.live_job(request.job_id).is_none() {
            return Err(TransportError::JobNotFound(request.job_id));
        }
        state
            .queues
            .entry(queue_name.to_string())
            .or_default()
            .push_back(request.clone());
        state.published.push((queue_name.to_string(), request.clone()));
        Ok(())
    }

    async fn pop_completion(
        &self,
        timeout: Duration,
    ) -> Result<Option<CompletionNotification>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(notification) = self.state.lock().await.completions.pop_front() {
                return Ok(Some(notification));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            if tokio::time::timeout(remaining, self.completion_ready.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }

    async fn get_results(&self, job_id: JobId) -> Result<Vec<String>, TransportError> {
        self.check_reads()?;
        Ok(self
            .state
            .lock()
            .await
            .results
            .get(&job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_errors(&self, job_id: JobId) -> Result<Vec<String>, TransportError> {
        self.check_reads()?;
        Ok(self
            .state
            .lock()
            .await
            .errors
            .get(&job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn try_lock_job(&self, job_id: JobId, ttl: Duration) -> Result<bool, TransportError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        if state.locks.get(&job_id).is_some_and(|until| *until > now) {
            return Ok(false);
        }
        state.locks.insert(job_id, now + chrono_ttl(ttl));
        Ok(true)
    }

    async fn unlock_job(&self, job_id: JobId) -> Result<(), TransportError> {
        self.state.lock().await.locks.remove(&job_id);
        Ok(())
    }

    async fn mark_drained(&self, job_id: JobId) -> Result<(), TransportError> {
        if let Some(meta) = self.state.lock().await.jobs.get_mut(&job_id) {
            meta.drained = true;
        }
        Ok(())
    }
}
