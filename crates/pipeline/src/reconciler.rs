//! Applies finished batch jobs back onto documents.
//!
//! Reconciling a job is idempotent: artifacts are keyed by
//! `(document_id, render_job_id)`, documents already out of the pending
//! family are left alone, and a short-lived transport marker keeps two
//! workers from applying the same job at once.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use certgen_core::document_status::DocumentStatus;
use certgen_core::types::{DbId, JobId};
use certgen_db::models::document::Document;
use certgen_db::models::generated_pdf::{CreateGeneratedPdf, DEFAULT_STORAGE_PROVIDER, STAGE_FINAL};
use certgen_db::repositories::{DocumentRepo, GeneratedPdfRepo};
use certgen_transport::{ErrorRecord, JobTransport, ResultRecord};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::transition::{complete_documents, transition_documents};

/// Why a job was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another reconciliation holds the marker.
    Locked,
    /// Metadata expired or never existed.
    MetaMissing,
    /// The renderer has not finished the job.
    NotFinished,
    /// Results were already committed.
    AlreadyDrained,
}

/// Counts from one applied job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub job_id: JobId,
    /// Documents moved to `PDF_COMPLETED`.
    pub completed: u32,
    /// Documents moved to `PDF_FAILED`.
    pub failed: u32,
    /// New `generated_pdfs` rows.
    pub artifacts: u32,
    /// Result lines that could not be parsed.
    pub malformed_lines: u32,
    /// Parsed results for documents this job does not own or that already
    /// left the pending family.
    pub ignored_results: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Applied(ReconcileReport),
    Skipped { reason: SkipReason },
}

/// Consumes completion notifications and reconciles the jobs they name.
pub struct CompletionReconciler {
    pool: PgPool,
    transport: Arc<dyn JobTransport>,
    config: Arc<PipelineConfig>,
    /// Jobs whose last attempt failed and are retried next tick.
    retry: Mutex<HashSet<JobId>>,
}

impl CompletionReconciler {
    pub fn new(pool: PgPool, transport: Arc<dyn JobTransport>, config: Arc<PipelineConfig>) -> Self {
        Self {
            pool,
            transport,
            config,
            retry: Mutex::new(HashSet::new()),
        }
    }

    /// Poll for completions until cancelled.
    ///
    /// Cancellation is observed between ticks; a job being applied always
    /// runs to commit or rollback.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            poll_timeout_ms = self.config.reconcile_poll_timeout.as_millis() as u64,
            concurrency = self.config.reconcile_concurrency,
            "Completion reconciler started",
        );

        while !cancel.is_cancelled() {
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "Completion poll failed");
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.config.reconcile_poll_timeout) => {}
                }
            }
        }

        tracing::info!("Completion reconciler stopped");
    }

    /// One poll: wait for a notification, drain whatever else is ready,
    /// and reconcile the batch with bounded parallelism.
    ///
    /// Returns the number of jobs attempted.
    pub async fn tick(&self) -> Result<usize, PipelineError> {
        let mut jobs: Vec<JobId> = self.retry.lock().await.drain().collect();

        let mut wait = if jobs.is_empty() {
            self.config.reconcile_poll_timeout
        } else {
            Duration::ZERO
        };
        while jobs.len() < self.config.reconcile_concurrency {
            let notification = match self.transport.pop_completion(wait).await {
                Ok(Some(n)) => n,
                Ok(None) => break,
                Err(e) if jobs.is_empty() => return Err(e.into()),
                // Retries already in hand still get their turn.
                Err(e) => {
                    tracing::warn!(error = %e, "Completion poll failed");
                    break;
                }
            };
            wait = Duration::ZERO;
            if !notification.status.is_terminal() {
                tracing::debug!(
                    job_id = %notification.job_id,
                    status = %notification.status,
                    "Ignoring non-terminal completion signal",
                );
                continue;
            }
            if !jobs.contains(&notification.job_id) {
                jobs.push(notification.job_id);
            }
        }

        let attempted = jobs.len();
        stream::iter(jobs)
            .map(|job_id| self.reconcile_logged(job_id))
            .buffer_unordered(self.config.reconcile_concurrency.max(1))
            .collect::<Vec<()>>()
            .await;
        Ok(attempted)
    }

    async fn reconcile_logged(&self, job_id: JobId) {
        match self.reconcile_job(job_id).await {
            Ok(ReconcileOutcome::Applied(report)) => {
                tracing::info!(
                    %job_id,
                    completed = report.completed,
                    failed = report.failed,
                    artifacts = report.artifacts,
                    malformed_lines = report.malformed_lines,
                    ignored_results = report.ignored_results,
                    "Batch job reconciled",
                );
            }
            Ok(ReconcileOutcome::Skipped { reason }) => {
                tracing::debug!(%job_id, ?reason, "Batch job skipped");
            }
            Err(e) => {
                tracing::error!(%job_id, error = %e, "Reconciliation failed, will retry");
                self.retry.lock().await.insert(job_id);
            }
        }
    }

    /// Apply one job's results under the reconciliation marker.
    ///
    /// The marker is released on every path except a successful apply,
    /// where it is left to expire so a replayed notification is skipped.
    pub async fn reconcile_job(&self, job_id: JobId) -> Result<ReconcileOutcome, PipelineError> {
        if !self
            .transport
            .try_lock_job(job_id, self.config.reconcile_lock_ttl)
            .await?
        {
            return Ok(ReconcileOutcome::Skipped {
                reason: SkipReason::Locked,
            });
        }

        let result = self.reconcile_locked(job_id).await;

        match &result {
            Ok(ReconcileOutcome::Applied(_)) => {
                if let Err(e) = self.transport.mark_drained(job_id).await {
                    tracing::warn!(%job_id, error = %e, "Failed to mark job drained");
                }
            }
            _ => {
                if let Err(e) = self.transport.unlock_job(job_id).await {
                    tracing::warn!(%job_id, error = %e, "Failed to release reconciliation marker");
                }
            }
        }
        result
    }

    async fn reconcile_locked(&self, job_id: JobId) -> Result<ReconcileOutcome, PipelineError> {
        let Some(meta) = self.transport.get_job_meta(job_id).await? else {
            return Ok(ReconcileOutcome::Skipped {
                reason: SkipReason::MetaMissing,
            });
        };
        if meta.drained {
            return Ok(ReconcileOutcome::Skipped {
                reason: SkipReason::AlreadyDrained,
            });
        }
        if !meta.status.is_terminal() {
            return Ok(ReconcileOutcome::Skipped {
                reason: SkipReason::NotFinished,
            });
        }

        let result_lines = self.transport.get_results(job_id).await?;
        let error_lines = self.transport.get_errors(job_id).await?;

        let mut report = ReconcileReport {
            job_id,
            ..Default::default()
        };
        let results = parse_results(job_id, &result_lines, &mut report);
        log_errors(job_id, &error_lines);

        let expected = usize::try_from(meta.total_items).unwrap_or(0);
        self.apply(job_id, expected, &results, &mut report).await?;
        Ok(ReconcileOutcome::Applied(report))
    }

    /// Write artifacts and statuses for one job in a single transaction.
    ///
    /// Fails with [`PipelineError::JobNotSettled`] while fewer than
    /// `expected` documents carry the job id, writing nothing.
    async fn apply(
        &self,
        job_id: JobId,
        expected: usize,
        results: &BTreeMap<DbId, ResultRecord>,
        report: &mut ReconcileReport,
    ) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await?;
        let owned = DocumentRepo::lock_by_job(&mut tx, job_id).await?;
        if owned.len() < expected {
            tx.rollback().await?;
            return Err(PipelineError::JobNotSettled {
                job_id,
                owned: owned.len(),
                expected,
            });
        }

        let mut succeeded: HashSet<DbId> = HashSet::new();
        let mut to_complete: Vec<&Document> = Vec::new();

        for (document_id, record) in results {
            let Some(doc) = owned.iter().find(|d| d.id == *document_id) else {
                tracing::warn!(
                    %job_id,
                    document_id,
                    "Result for a document this job does not own",
                );
                report.ignored_results += 1;
                continue;
            };
            let status = doc.status()?;
            if !status.is_pending_family() {
                tracing::debug!(
                    %job_id,
                    document_id,
                    status = %status,
                    "Document already settled, result ignored",
                );
                report.ignored_results += 1;
                continue;
            }

            let artifact = CreateGeneratedPdf {
                document_id: doc.id,
                render_job_id: job_id,
                file_id: record.file_id,
                file_name: record.file_name.clone(),
                file_hash: record.file_hash.clone(),
                file_size_bytes: record.file_size_bytes,
                storage_provider: record
                    .storage_provider
                    .clone()
                    .unwrap_or_else(|| DEFAULT_STORAGE_PROVIDER.to_string()),
                stage: STAGE_FINAL.to_string(),
            };
            if GeneratedPdfRepo::insert_if_absent(&mut tx, &artifact)
                .await?
                .is_some()
            {
                report.artifacts += 1;
            }
            succeeded.insert(doc.id);
            to_complete.push(doc);
        }

        report.completed = complete_documents(&mut tx, &to_complete).await? as u32;

        if self.config.mark_unreported_failed {
            let unreported: Vec<Document> = owned
                .iter()
                .filter(|d| !succeeded.contains(&d.id))
                .filter(|d| d.status().is_ok_and(DocumentStatus::is_pending_family))
                .cloned()
                .collect();
            report.failed =
                transition_documents(&mut tx, &unreported, DocumentStatus::PdfFailed, None).await?
                    as u32;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Parse result lines, keeping the first record per document.
fn parse_results(
    job_id: JobId,
    lines: &[String],
    report: &mut ReconcileReport,
) -> BTreeMap<DbId, ResultRecord> {
    let mut records = BTreeMap::new();
    for (index, line) in lines.iter().enumerate() {
        match ResultRecord::parse(line) {
            Ok(record) => {
                records.entry(record.document_id).or_insert(record);
            }
            Err(e) => {
                tracing::warn!(%job_id, line = index, error = %e, "Skipping unusable result line");
                report.malformed_lines += 1;
            }
        }
    }
    records
}

/// Per-item failures are informational; unreported items are failed anyway.
fn log_errors(job_id: JobId, lines: &[String]) {
    for (index, line) in lines.iter().enumerate() {
        match ErrorRecord::parse(line) {
            Ok(record) => tracing::info!(
                %job_id,
                document_id = ?record.document_id,
                error = %record.error,
                "Renderer reported item failure",
            ),
            Err(e) => tracing::warn!(%job_id, line = index, error = %e, "Skipping unusable error line"),
        }
    }
}
