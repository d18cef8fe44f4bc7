//! Participant (user detail) model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use certgen_core::types::{DbId, Timestamp};

/// A row from the `user_details` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserDetail {
    pub id: DbId,
    pub full_name: String,
    pub email: Option<String>,
    pub created_at: Timestamp,
}

/// DTO for creating a participant record.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserDetail {
    pub full_name: String,
    pub email: Option<String>,
}
