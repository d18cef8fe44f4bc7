//! Rows backing the Postgres job transport.

use serde::Serialize;
use sqlx::FromRow;
use certgen_core::types::{DbId, JobId, Timestamp};

/// Item kind for renderer-appended success lines.
pub const ITEM_KIND_RESULT: &str = "result";

/// Item kind for renderer-appended failure lines.
pub const ITEM_KIND_ERROR: &str = "error";

/// A row from the `render_jobs` table (job metadata with TTL).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RenderJobRow {
    pub job_id: JobId,
    pub event_id: Option<DbId>,
    pub job_type: String,
    pub total_items: i32,
    pub processed_items: i32,
    pub failed_items: i32,
    pub status: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub drained_at: Option<Timestamp>,
}

/// A row from the `render_queue` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RenderQueueEntry {
    pub id: DbId,
    pub queue_name: String,
    pub job_id: JobId,
    pub payload: serde_json::Value,
    pub enqueued_at: Timestamp,
    pub claimed_at: Option<Timestamp>,
}

/// A popped row from the `render_completions` table.
#[derive(Debug, Clone, FromRow)]
pub struct RenderCompletionRow {
    pub id: DbId,
    pub job_id: JobId,
    pub payload: serde_json::Value,
}
