//! Repository for the `templates` and `template_fields` tables.

use sqlx::PgPool;
use certgen_core::types::DbId;

use crate::models::template::{CreateTemplate, Template};

/// Column list for `templates` queries.
const COLUMNS: &str = "id, name, series, file_ref, is_public, created_at, updated_at";

pub struct TemplateRepo;

impl TemplateRepo {
    /// Insert a template and its ordered field keys in one transaction.
    pub async fn create(pool: &PgPool, input: &CreateTemplate) -> Result<Template, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO templates (name, series, file_ref, is_public) VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        let template = sqlx::query_as::<_, Template>(&query)
            .bind(&input.name)
            .bind(&input.series)
            .bind(&input.file_ref)
            .bind(input.is_public)
            .fetch_one(&mut *tx)
            .await?;

        for (order, key) in input.field_keys.iter().enumerate() {
            sqlx::query(
                "INSERT INTO template_fields (template_id, field_key, sort_order) VALUES ($1, $2, $3)",
            )
            .bind(template.id)
            .bind(key)
            .bind(order as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(template)
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Template>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM templates WHERE id = $1");
        sqlx::query_as::<_, Template>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Field keys of a template in render order.
    pub async fn field_keys(pool: &PgPool, template_id: DbId) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT field_key FROM template_fields WHERE template_id = $1 ORDER BY sort_order, id",
        )
        .bind(template_id)
        .fetch_all(pool)
        .await
    }
}
