//! Serial and verification code allocation.
//!
//! A generation run holds the event row lock for its whole insert
//! transaction, so counters handed out here never overlap with another run
//! for the same event. Each insert still runs in its own savepoint: a unique
//! violation rolls back that one attempt and the allocator retries with
//! fresh codes, up to `max_attempts`.

use certgen_core::codes::{format_serial, generate_verification_code};
use certgen_core::types::DbId;
use certgen_db::models::document::{Document, NewDocument};
use certgen_db::repositories::DocumentRepo;
use certgen_db::unique_violation_constraint;
use sqlx::{Connection, Postgres, Transaction};

use crate::error::PipelineError;

/// Unique constraint on `documents.serial_code`.
pub const SERIAL_CONSTRAINT: &str = "uq_documents_serial_code";

/// Unique constraint on `documents.verification_code`.
pub const VERIFICATION_CONSTRAINT: &str = "uq_documents_verification_code";

/// Everything about a new document except its codes.
#[derive(Debug, Clone)]
pub struct DocumentDraft {
    pub event_id: DbId,
    pub user_detail_id: DbId,
    pub template_id: DbId,
    pub is_public: bool,
}

type CodeSource = Box<dyn FnMut() -> String + Send>;

/// Hands out `{prefix}{counter}` serials for one prefix within a transaction.
pub struct CodeAllocator {
    prefix: String,
    next: i64,
    pad_width: usize,
    max_attempts: u32,
    codes: CodeSource,
}

impl CodeAllocator {
    /// Seed the counter from the highest serial already stored under `prefix`.
    pub async fn start(
        tx: &mut Transaction<'_, Postgres>,
        prefix: String,
        pad_width: usize,
        max_attempts: u32,
    ) -> Result<Self, sqlx::Error> {
        let max = DocumentRepo::max_serial_counter(tx, &prefix).await?.unwrap_or(0);
        Ok(Self::with_counter(prefix, max + 1, pad_width, max_attempts))
    }

    /// Start from an explicit counter value.
    pub fn with_counter(prefix: String, next: i64, pad_width: usize, max_attempts: u32) -> Self {
        Self {
            prefix,
            next,
            pad_width,
            max_attempts: max_attempts.max(1),
            codes: Box::new(generate_verification_code),
        }
    }

    /// Replace the verification code generator.
    pub fn with_code_source(mut self, source: impl FnMut() -> String + Send + 'static) -> Self {
        self.codes = Box::new(source);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Serial the next successful insert will receive, absent collisions.
    pub fn peek_serial(&self) -> String {
        format_serial(&self.prefix, self.next, self.pad_width)
    }

    /// Insert one `CREATED` document with freshly allocated codes.
    ///
    /// A serial collision re-reads the stored maximum and moves past it; a
    /// verification collision draws a new code. Any other database error is
    /// returned as-is.
    pub async fn insert(
        &mut self,
        tx: &mut Transaction<'_, Postgres>,
        draft: &DocumentDraft,
    ) -> Result<Document, PipelineError> {
        for attempt in 1..=self.max_attempts {
            let input = NewDocument {
                event_id: Some(draft.event_id),
                user_detail_id: draft.user_detail_id,
                template_id: Some(draft.template_id),
                serial_code: self.peek_serial(),
                verification_code: (self.codes)(),
                is_public: draft.is_public,
            };

            let mut savepoint = Connection::begin(&mut **tx).await?;
            let err = match DocumentRepo::insert(&mut savepoint, &input).await {
                Ok(doc) => {
                    savepoint.commit().await?;
                    self.next += 1;
                    return Ok(doc);
                }
                Err(e) => e,
            };
            savepoint.rollback().await?;

            match unique_violation_constraint(&err).as_deref() {
                Some(SERIAL_CONSTRAINT) => {
                    let stored = DocumentRepo::max_serial_counter(tx, &self.prefix)
                        .await?
                        .unwrap_or(0);
                    self.next = (self.next + 1).max(stored + 1);
                    tracing::warn!(
                        serial = %input.serial_code,
                        attempt,
                        next = self.next,
                        "Serial code collision, advancing counter",
                    );
                }
                Some(VERIFICATION_CONSTRAINT) => {
                    tracing::warn!(attempt, "Verification code collision, regenerating");
                }
                _ => return Err(err.into()),
            }
        }

        Err(PipelineError::SerialAllocationExhausted {
            serial_prefix: self.prefix.clone(),
            attempts: self.max_attempts,
        })
    }
}
