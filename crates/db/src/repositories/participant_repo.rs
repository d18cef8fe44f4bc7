//! Repository for the `user_details` table.

use sqlx::PgPool;
use certgen_core::types::DbId;

use crate::models::participant::{CreateUserDetail, UserDetail};

/// Column list for `user_details` queries.
const COLUMNS: &str = "id, full_name, email, created_at";

pub struct ParticipantRepo;

impl ParticipantRepo {
    pub async fn create(pool: &PgPool, input: &CreateUserDetail) -> Result<UserDetail, sqlx::Error> {
        let query = format!(
            "INSERT INTO user_details (full_name, email) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UserDetail>(&query)
            .bind(&input.full_name)
            .bind(&input.email)
            .fetch_one(pool)
            .await
    }

    /// Fetch participants by ID. Missing IDs are silently absent.
    pub async fn find_by_ids(pool: &PgPool, ids: &[DbId]) -> Result<Vec<UserDetail>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM user_details WHERE id = ANY($1) ORDER BY id");
        sqlx::query_as::<_, UserDetail>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }
}
