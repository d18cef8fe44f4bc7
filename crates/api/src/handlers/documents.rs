//! Document verification and renewal.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use certgen_core::codes::is_valid_verification_code;
use certgen_core::document_status::DocumentStatus;
use certgen_core::types::DbId;
use certgen_db::models::document::Document;
use certgen_db::models::generated_pdf::GeneratedPdf;
use certgen_db::repositories::{DocumentRepo, GeneratedPdfRepo};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// A document found by its verification code.
#[derive(Debug, Serialize)]
pub struct VerifiedDocument {
    #[serde(flatten)]
    pub document: Document,
    pub status: DocumentStatus,
    /// Most recent rendered artifact, if any.
    pub latest_pdf: Option<GeneratedPdf>,
}

#[derive(Debug, Deserialize)]
pub struct RenewRequest {
    pub document_ids: Vec<DbId>,
}

#[derive(Debug, Serialize)]
pub struct RenewResponse {
    pub renewed: u64,
}

/// GET /api/v1/documents/verify/{code}
pub async fn verify(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> AppResult<impl IntoResponse> {
    let code = code.trim();
    if !is_valid_verification_code(code) {
        return Err(AppError::BadRequest(format!("malformed verification code {code}")));
    }
    let document = DocumentRepo::find_by_verification_code(&state.pool, code)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no document with verification code {code}")))?;
    let status = document.status()?;
    let latest_pdf = GeneratedPdfRepo::latest_for_document(&state.pool, document.id).await?;

    Ok(Json(DataResponse {
        data: VerifiedDocument {
            document,
            status,
            latest_pdf,
        },
    }))
}

/// POST /api/v1/documents/renew
///
/// Move finished documents back to `RENEW` so the next generation action
/// re-renders them. All-or-nothing.
pub async fn renew(
    State(state): State<AppState>,
    Json(input): Json<RenewRequest>,
) -> AppResult<impl IntoResponse> {
    if input.document_ids.is_empty() {
        return Err(AppError::BadRequest(
            "document_ids must not be empty".to_string(),
        ));
    }

    let renewed = state
        .orchestrator
        .renew_documents(&input.document_ids)
        .await?;

    Ok(Json(DataResponse {
        data: RenewResponse { renewed },
    }))
}
