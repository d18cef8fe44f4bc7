//! Event model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use certgen_core::types::{DbId, Timestamp};

/// A row from the `events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Event {
    pub id: DbId,
    /// Short code used as the serial prefix, e.g. `DEVCONF24`.
    pub code: String,
    pub name: String,
    pub template_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a new event.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateEvent {
    pub code: String,
    pub name: String,
    pub template_id: Option<DbId>,
}
