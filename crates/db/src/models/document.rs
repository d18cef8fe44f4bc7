//! Certificate document model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use certgen_core::document_status::{DocumentStatus, StatusId};
use certgen_core::error::CoreError;
use certgen_core::types::{DbId, JobId, Timestamp};

/// A row from the `documents` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Document {
    pub id: DbId,
    pub event_id: Option<DbId>,
    pub user_detail_id: DbId,
    pub template_id: Option<DbId>,
    pub serial_code: String,
    pub verification_code: String,
    pub status_id: StatusId,
    pub digital_signature_status: String,
    pub required_signatures: i32,
    pub signed_signatures: i32,
    pub is_public: bool,
    /// Batch job currently (or most recently) responsible for rendering.
    pub pdf_job_id: Option<JobId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Document {
    /// Decode `status_id`. An id outside the seed table is a schema bug.
    pub fn status(&self) -> Result<DocumentStatus, CoreError> {
        DocumentStatus::from_id(self.status_id).ok_or_else(|| {
            CoreError::Internal(format!(
                "document {} has unknown status_id {}",
                self.id, self.status_id
            ))
        })
    }
}

/// Insert DTO; documents always start in `CREATED`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDocument {
    pub event_id: Option<DbId>,
    pub user_detail_id: DbId,
    pub template_id: Option<DbId>,
    pub serial_code: String,
    pub verification_code: String,
    pub is_public: bool,
}
