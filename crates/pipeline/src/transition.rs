//! Validated document status writes.
//!
//! The only path by which the pipeline changes `documents.status_id`.
//! Callers pass rows they locked in the same transaction; any rejected
//! transition fails the whole call before anything is written.

use certgen_core::document_status::DocumentStatus;
use certgen_core::types::{DbId, JobId};
use certgen_db::models::document::Document;
use certgen_db::repositories::DocumentRepo;
use sqlx::{Postgres, Transaction};

use crate::error::PipelineError;

/// Move every document to `to`, optionally stamping a new batch job.
pub async fn transition_documents(
    tx: &mut Transaction<'_, Postgres>,
    docs: &[Document],
    to: DocumentStatus,
    pdf_job_id: Option<JobId>,
) -> Result<u64, PipelineError> {
    for doc in docs {
        doc.status()?.validate_transition(to)?;
    }
    let ids: Vec<DbId> = docs.iter().map(|d| d.id).collect();
    Ok(DocumentRepo::set_status_many(tx, &ids, to, pdf_job_id).await?)
}

/// Advance pending-family documents to `PDF_COMPLETED`.
///
/// Each intermediate hop of the rendering pipeline is checked against the
/// transition table; only the final status is persisted.
pub async fn complete_documents(
    tx: &mut Transaction<'_, Postgres>,
    docs: &[&Document],
) -> Result<u64, PipelineError> {
    for doc in docs {
        doc.status()?.completion_path()?;
    }
    let ids: Vec<DbId> = docs.iter().map(|d| d.id).collect();
    Ok(DocumentRepo::set_status_many(tx, &ids, DocumentStatus::PdfCompleted, None).await?)
}
