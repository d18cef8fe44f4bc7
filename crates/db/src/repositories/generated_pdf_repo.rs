//! Repository for the append-only `generated_pdfs` table.

use sqlx::{PgPool, Postgres, Transaction};
use certgen_core::types::DbId;

use crate::models::generated_pdf::{CreateGeneratedPdf, GeneratedPdf};

/// Column list for `generated_pdfs` queries.
const COLUMNS: &str = "\
    id, document_id, render_job_id, file_id, file_name, file_hash, file_size_bytes, \
    storage_provider, stage, version, created_at";

pub struct GeneratedPdfRepo;

impl GeneratedPdfRepo {
    /// Append an artifact unless this job already recorded one for the document.
    ///
    /// Returns `None` when the row already existed, which makes replaying a
    /// job's results a no-op. The caller must hold the document row lock so
    /// the per-document `version` cannot race.
    pub async fn insert_if_absent(
        tx: &mut Transaction<'_, Postgres>,
        input: &CreateGeneratedPdf,
    ) -> Result<Option<GeneratedPdf>, sqlx::Error> {
        let query = format!(
            "INSERT INTO generated_pdfs \
                 (document_id, render_job_id, file_id, file_name, file_hash, file_size_bytes, \
                  storage_provider, stage, version) \
             SELECT $1, $2, $3, $4, $5, $6, $7, $8, \
                    COALESCE((SELECT MAX(version) FROM generated_pdfs WHERE document_id = $1), 0) + 1 \
             ON CONFLICT (document_id, render_job_id) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GeneratedPdf>(&query)
            .bind(input.document_id)
            .bind(input.render_job_id)
            .bind(input.file_id)
            .bind(&input.file_name)
            .bind(&input.file_hash)
            .bind(input.file_size_bytes)
            .bind(&input.storage_provider)
            .bind(&input.stage)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Every artifact of a document, oldest version first.
    pub async fn list_for_document(
        pool: &PgPool,
        document_id: DbId,
    ) -> Result<Vec<GeneratedPdf>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generated_pdfs WHERE document_id = $1 ORDER BY version"
        );
        sqlx::query_as::<_, GeneratedPdf>(&query)
            .bind(document_id)
            .fetch_all(pool)
            .await
    }

    /// Latest artifact of a document, if any.
    pub async fn latest_for_document(
        pool: &PgPool,
        document_id: DbId,
    ) -> Result<Option<GeneratedPdf>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generated_pdfs WHERE document_id = $1 \
             ORDER BY version DESC LIMIT 1"
        );
        sqlx::query_as::<_, GeneratedPdf>(&query)
            .bind(document_id)
            .fetch_optional(pool)
            .await
    }
}
