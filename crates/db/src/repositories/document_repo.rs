//! Repository for the `documents` table.
//!
//! Status writes here are raw primitives: callers validate every
//! transition against `DocumentStatus` while holding the row lock obtained
//! from one of the `lock_*` methods, then call [`DocumentRepo::set_status_many`].

use sqlx::{PgPool, Postgres, Transaction};
use certgen_core::document_status::{DocumentStatus, StatusId};
use certgen_core::types::{DbId, JobId, Timestamp};

use crate::models::document::{Document, NewDocument};

/// Column list for `documents` queries.
const COLUMNS: &str = "\
    id, event_id, user_detail_id, template_id, serial_code, verification_code, \
    status_id, digital_signature_status, required_signatures, signed_signatures, \
    is_public, pdf_job_id, created_at, updated_at";

/// Provides document creation, lookups, and row-locking primitives.
pub struct DocumentRepo;

impl DocumentRepo {
    /// Insert a document in `CREATED` status.
    ///
    /// Unique violations (`uq_documents_serial_code`,
    /// `uq_documents_verification_code`) surface as `sqlx::Error::Database`;
    /// run this inside a savepoint when the caller wants to retry.
    pub async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        input: &NewDocument,
    ) -> Result<Document, sqlx::Error> {
        let query = format!(
            "INSERT INTO documents \
                 (event_id, user_detail_id, template_id, serial_code, verification_code, \
                  status_id, is_public) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Document>(&query)
            .bind(input.event_id)
            .bind(input.user_detail_id)
            .bind(input.template_id)
            .bind(&input.serial_code)
            .bind(&input.verification_code)
            .bind(DocumentStatus::Created.id())
            .bind(input.is_public)
            .fetch_one(&mut **tx)
            .await
    }

    /// Find a document by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Document>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM documents WHERE id = $1");
        sqlx::query_as::<_, Document>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Public verification lookup.
    pub async fn find_by_verification_code(
        pool: &PgPool,
        code: &str,
    ) -> Result<Option<Document>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM documents WHERE verification_code = $1");
        sqlx::query_as::<_, Document>(&query)
            .bind(code)
            .fetch_optional(pool)
            .await
    }

    /// All documents of an event, oldest first.
    pub async fn list_by_event(pool: &PgPool, event_id: DbId) -> Result<Vec<Document>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM documents WHERE event_id = $1 ORDER BY id");
        sqlx::query_as::<_, Document>(&query)
            .bind(event_id)
            .fetch_all(pool)
            .await
    }

    /// All documents stamped with a batch job.
    pub async fn list_by_job(pool: &PgPool, job_id: JobId) -> Result<Vec<Document>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM documents WHERE pdf_job_id = $1 ORDER BY id");
        sqlx::query_as::<_, Document>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

    /// Documents that already exist for the `(event, participant, template)`
    /// triples of the given participants.
    pub async fn find_for_participants(
        tx: &mut Transaction<'_, Postgres>,
        event_id: DbId,
        template_id: DbId,
        user_detail_ids: &[DbId],
    ) -> Result<Vec<Document>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM documents \
             WHERE event_id = $1 AND template_id = $2 AND user_detail_id = ANY($3) \
             ORDER BY id"
        );
        sqlx::query_as::<_, Document>(&query)
            .bind(event_id)
            .bind(template_id)
            .bind(user_detail_ids)
            .fetch_all(&mut **tx)
            .await
    }

    /// Highest numeric counter among serial codes starting with `prefix`.
    ///
    /// Only suffixes made purely of digits are considered, so a prefix such
    /// as `EV-A-` never picks up `EV-AB-00001`.
    pub async fn max_serial_counter(
        tx: &mut Transaction<'_, Postgres>,
        prefix: &str,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MAX(CAST(substr(serial_code, length($1) + 1) AS BIGINT)) \
             FROM documents \
             WHERE left(serial_code, length($1)) = $1 \
               AND substr(serial_code, length($1) + 1) ~ '^[0-9]{1,18}$'",
        )
        .bind(prefix)
        .fetch_one(&mut **tx)
        .await
    }

    /// Lock the target documents that may be handed to the renderer.
    ///
    /// Rows already locked by a concurrent enqueue are skipped so that a
    /// document is never owned by two active jobs.
    pub async fn lock_enqueueable(
        tx: &mut Transaction<'_, Postgres>,
        event_id: DbId,
        template_id: DbId,
        user_detail_ids: &[DbId],
    ) -> Result<Vec<Document>, sqlx::Error> {
        let enqueueable: Vec<StatusId> = DocumentStatus::ALL
            .into_iter()
            .filter(|s| s.is_enqueueable())
            .map(DocumentStatus::id)
            .collect();
        let query = format!(
            "SELECT {COLUMNS} FROM documents \
             WHERE event_id = $1 AND template_id = $2 AND user_detail_id = ANY($3) \
               AND status_id = ANY($4) \
             ORDER BY id \
             FOR UPDATE SKIP LOCKED"
        );
        sqlx::query_as::<_, Document>(&query)
            .bind(event_id)
            .bind(template_id)
            .bind(user_detail_ids)
            .bind(&enqueueable)
            .fetch_all(&mut **tx)
            .await
    }

    /// Lock documents by ID, in ID order to avoid lock-order deadlocks.
    pub async fn lock_by_ids(
        tx: &mut Transaction<'_, Postgres>,
        ids: &[DbId],
    ) -> Result<Vec<Document>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM documents WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        );
        sqlx::query_as::<_, Document>(&query)
            .bind(ids)
            .fetch_all(&mut **tx)
            .await
    }

    /// Lock every document stamped with a batch job.
    pub async fn lock_by_job(
        tx: &mut Transaction<'_, Postgres>,
        job_id: JobId,
    ) -> Result<Vec<Document>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM documents WHERE pdf_job_id = $1 ORDER BY id FOR UPDATE"
        );
        sqlx::query_as::<_, Document>(&query)
            .bind(job_id)
            .fetch_all(&mut **tx)
            .await
    }

    /// Write an already-validated status to the given documents.
    ///
    /// When `pdf_job_id` is `Some`, the job reference is (re)stamped;
    /// otherwise the existing reference is kept as history.
    pub async fn set_status_many(
        tx: &mut Transaction<'_, Postgres>,
        ids: &[DbId],
        status: DocumentStatus,
        pdf_job_id: Option<JobId>,
    ) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE documents \
             SET status_id = $2, pdf_job_id = COALESCE($3, pdf_job_id) \
             WHERE id = ANY($1)",
        )
        .bind(ids)
        .bind(status.id())
        .bind(pdf_job_id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// Documents in a pending-family status last touched before `cutoff`.
    ///
    /// Feeds the abandoned-job sweep.
    pub async fn find_stale_pending(
        pool: &PgPool,
        cutoff: Timestamp,
        limit: i64,
    ) -> Result<Vec<Document>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM documents \
             WHERE status_id = ANY($1) AND updated_at < $2 \
             ORDER BY updated_at \
             LIMIT $3"
        );
        sqlx::query_as::<_, Document>(&query)
            .bind(DocumentStatus::pending_family_ids())
            .bind(cutoff)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Count documents per status for an event (status id, count).
    pub async fn status_counts(
        pool: &PgPool,
        event_id: DbId,
    ) -> Result<Vec<(StatusId, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (StatusId, i64)>(
            "SELECT status_id, COUNT(*) FROM documents WHERE event_id = $1 \
             GROUP BY status_id ORDER BY status_id",
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
    }
}
