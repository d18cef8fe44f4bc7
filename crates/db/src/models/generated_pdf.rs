//! Generated-PDF artifact model. Rows are append-only.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use certgen_core::types::{DbId, JobId, Timestamp};

/// Stage label for the final rendered artifact.
pub const STAGE_FINAL: &str = "FINAL";

/// Storage provider recorded when the renderer does not name one.
pub const DEFAULT_STORAGE_PROVIDER: &str = "local";

/// A row from the `generated_pdfs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GeneratedPdf {
    pub id: DbId,
    pub document_id: DbId,
    pub render_job_id: JobId,
    pub file_id: uuid::Uuid,
    pub file_name: Option<String>,
    pub file_hash: Option<String>,
    pub file_size_bytes: Option<i64>,
    pub storage_provider: String,
    pub stage: String,
    pub version: i32,
    pub created_at: Timestamp,
}

/// Insert DTO. `version` is assigned by the repository.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateGeneratedPdf {
    pub document_id: DbId,
    pub render_job_id: JobId,
    pub file_id: uuid::Uuid,
    pub file_name: Option<String>,
    pub file_hash: Option<String>,
    pub file_size_bytes: Option<i64>,
    pub storage_provider: String,
    pub stage: String,
}
