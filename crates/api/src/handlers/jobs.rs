//! Render job progress.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use certgen_core::document_status::DocumentStatus;
use certgen_core::types::{DbId, JobId};
use certgen_db::repositories::DocumentRepo;
use certgen_pipeline::PipelineError;
use certgen_transport::JobMeta;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Job bookkeeping plus the current status of every document it owns.
#[derive(Debug, Serialize)]
pub struct JobProgress {
    #[serde(flatten)]
    pub meta: JobMeta,
    pub documents: Vec<JobDocument>,
}

#[derive(Debug, Serialize)]
pub struct JobDocument {
    pub id: DbId,
    pub serial_code: String,
    pub status: DocumentStatus,
}

/// GET /api/v1/jobs/{job_id}
///
/// 404 once the job metadata has expired.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let meta = state
        .transport
        .get_job_meta(job_id)
        .await
        .map_err(PipelineError::from)?
        .ok_or_else(|| AppError::NotFound(format!("render job {job_id} not found")))?;

    let documents = DocumentRepo::list_by_job(&state.pool, job_id)
        .await?
        .into_iter()
        .map(|doc| -> AppResult<JobDocument> {
            Ok(JobDocument {
                status: doc.status()?,
                id: doc.id,
                serial_code: doc.serial_code,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    Ok(Json(DataResponse {
        data: JobProgress { meta, documents },
    }))
}
