//! Certificate template model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use certgen_core::types::{DbId, Timestamp};

/// A row from the `templates` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Template {
    pub id: DbId,
    pub name: String,
    /// Serial series, the middle segment of `{event}-{series}-{counter}`.
    pub series: String,
    /// Opaque reference the renderer resolves to the template file.
    pub file_ref: String,
    pub is_public: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `template_fields` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TemplateField {
    pub id: DbId,
    pub template_id: DbId,
    pub field_key: String,
    pub sort_order: i32,
}

/// DTO for creating a template together with its ordered field keys.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplate {
    pub name: String,
    pub series: String,
    pub file_ref: String,
    pub is_public: bool,
    pub field_keys: Vec<String>,
}
