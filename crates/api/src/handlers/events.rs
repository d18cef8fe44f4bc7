//! Handlers for generation actions and per-event document summaries.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use certgen_core::document_status::DocumentStatus;
use certgen_core::types::DbId;
use certgen_db::repositories::{DocumentRepo, EventRepo};
use certgen_pipeline::request_builder::QrOverrides;
use certgen_pipeline::PipelineError;
use certgen_transport::KeyValue;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /api/v1/events/{id}/actions`.
#[derive(Debug, Deserialize)]
pub struct RunActionRequest {
    /// Action discriminator, e.g. `generate_certificates`.
    pub action: String,
    /// Restrict the action to these participants. Omitted or empty means
    /// the whole roster.
    #[serde(default)]
    pub participant_ids: Option<Vec<DbId>>,
    /// QR image parameters appended after the defaults.
    #[serde(default)]
    pub qr: Vec<KeyValue>,
    /// QR placement parameters appended after the defaults.
    #[serde(default)]
    pub qr_pdf: Vec<KeyValue>,
}

/// Document count for one status.
#[derive(Debug, Serialize)]
pub struct StatusCount {
    pub status: DocumentStatus,
    pub count: i64,
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// POST /api/v1/events/{id}/actions
///
/// Run a generation action. Returns 202 when a render job was published,
/// 200 when every target was already settled. Never waits for rendering.
pub async fn run_action(
    State(state): State<AppState>,
    Path(event_id): Path<DbId>,
    Json(input): Json<RunActionRequest>,
) -> AppResult<impl IntoResponse> {
    let overrides = QrOverrides {
        qr: input.qr,
        qr_pdf: input.qr_pdf,
    };

    let outcome = state
        .orchestrator
        .run_action_with(
            event_id,
            &input.action,
            input.participant_ids.as_deref(),
            &overrides,
        )
        .await?;

    let status = if outcome.job_id.is_some() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(DataResponse { data: outcome })))
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// GET /api/v1/events/{id}/documents/summary
///
/// Document counts per status for an event.
pub async fn document_summary(
    State(state): State<AppState>,
    Path(event_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    EventRepo::find_by_id(&state.pool, event_id)
        .await?
        .ok_or(PipelineError::EventNotFound(event_id))?;

    let counts = DocumentRepo::status_counts(&state.pool, event_id).await?;
    let data: Vec<StatusCount> = counts
        .into_iter()
        .filter_map(|(status_id, count)| {
            DocumentStatus::from_id(status_id).map(|status| StatusCount { status, count })
        })
        .collect();

    Ok(Json(DataResponse { data }))
}
