//! Closes out documents stuck in the pending family.
//!
//! A document whose job outlived its TTL is either waiting on a completion
//! signal that was lost (metadata still says the job finished) or owned by
//! a job the renderer never finished. The first case is reconciled, the
//! second is failed. Neither is re-queued automatically: a user renews the
//! document and runs the action again.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use certgen_core::document_status::DocumentStatus;
use certgen_core::types::{DbId, JobId};
use certgen_db::models::document::Document;
use certgen_db::repositories::DocumentRepo;
use certgen_transport::JobTransport;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::reconciler::{CompletionReconciler, ReconcileOutcome};
use crate::transition::transition_documents;

/// Stale documents examined per sweep.
const SWEEP_BATCH_LIMIT: i64 = 500;

/// Counts from one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Stale documents examined.
    pub examined: u32,
    /// Jobs whose lost completion was recovered.
    pub reconciled_jobs: u32,
    /// Documents moved to `PDF_FAILED` as abandoned.
    pub failed: u32,
    /// Documents left alone because their job is still in flight.
    pub in_flight: u32,
    /// Jobs whose handling failed this sweep; retried on the next one.
    pub errored_jobs: u32,
}

/// Periodic abandoned-job sweep.
pub struct AbandonedJobSweeper {
    pool: PgPool,
    transport: Arc<dyn JobTransport>,
    reconciler: Arc<CompletionReconciler>,
    config: Arc<PipelineConfig>,
}

impl AbandonedJobSweeper {
    pub fn new(
        pool: PgPool,
        transport: Arc<dyn JobTransport>,
        reconciler: Arc<CompletionReconciler>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            pool,
            transport,
            reconciler,
            config,
        }
    }

    /// Sweep on a fixed interval until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        tracing::info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            job_ttl_secs = self.config.job_ttl.as_secs(),
            "Abandoned job sweeper started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Abandoned job sweeper stopped");
                    break;
                }
                _ = interval.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report.examined > 0 => {
                            tracing::info!(
                                examined = report.examined,
                                reconciled_jobs = report.reconciled_jobs,
                                failed = report.failed,
                                in_flight = report.in_flight,
                                errored_jobs = report.errored_jobs,
                                "Abandoned job sweep complete",
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Abandoned job sweep failed"),
                    }
                }
            }
        }
    }

    /// Examine pending documents untouched for longer than the job TTL.
    pub async fn sweep_once(&self) -> Result<SweepReport, PipelineError> {
        let ttl = chrono::Duration::from_std(self.config.job_ttl)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let cutoff = chrono::Utc::now() - ttl;
        let stale = DocumentRepo::find_stale_pending(&self.pool, cutoff, SWEEP_BATCH_LIMIT).await?;

        let mut report = SweepReport {
            examined: stale.len() as u32,
            ..Default::default()
        };

        let mut by_job: BTreeMap<Option<JobId>, Vec<DbId>> = BTreeMap::new();
        for doc in &stale {
            by_job.entry(doc.pdf_job_id).or_default().push(doc.id);
        }

        for (job_id, doc_ids) in by_job {
            if let Err(e) = self.sweep_job(job_id, &doc_ids, &mut report).await {
                tracing::error!(job_id = ?job_id, error = %e, "Sweeping job failed, continuing");
                report.errored_jobs += 1;
            }
        }

        Ok(report)
    }

    /// Settle the stale documents of one job reference.
    async fn sweep_job(
        &self,
        job_id: Option<JobId>,
        doc_ids: &[DbId],
        report: &mut SweepReport,
    ) -> Result<(), PipelineError> {
        let Some(job_id) = job_id else {
            report.failed += self.fail_abandoned(None, doc_ids).await?;
            return Ok(());
        };

        match self.transport.get_job_meta(job_id).await? {
            Some(meta) if meta.status.is_terminal() && !meta.drained => {
                match self.reconciler.reconcile_job(job_id).await? {
                    ReconcileOutcome::Applied(_) => report.reconciled_jobs += 1,
                    ReconcileOutcome::Skipped { reason } => {
                        tracing::debug!(%job_id, ?reason, "Sweep left job to reconciler");
                        report.in_flight += doc_ids.len() as u32;
                    }
                }
            }
            Some(meta) if !meta.status.is_terminal() => {
                report.in_flight += doc_ids.len() as u32;
            }
            // Expired, missing, or drained but still pending.
            _ => {
                report.failed += self.fail_abandoned(Some(job_id), doc_ids).await?;
            }
        }
        Ok(())
    }

    /// Fail documents that are still pending under the same job reference.
    async fn fail_abandoned(
        &self,
        job_id: Option<JobId>,
        doc_ids: &[DbId],
    ) -> Result<u32, PipelineError> {
        let mut tx = self.pool.begin().await?;
        let stuck: Vec<Document> = DocumentRepo::lock_by_ids(&mut tx, doc_ids)
            .await?
            .into_iter()
            .filter(|d| d.pdf_job_id == job_id)
            .filter(|d| d.status().is_ok_and(DocumentStatus::is_pending_family))
            .collect();
        let failed = transition_documents(&mut tx, &stuck, DocumentStatus::PdfFailed, None).await?;
        tx.commit().await?;

        if failed > 0 {
            tracing::warn!(job_id = ?job_id, count = failed, "Abandoned documents marked failed");
        }
        Ok(failed as u32)
    }
}
