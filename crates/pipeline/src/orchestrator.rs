//! Generation actions: create missing documents and hand the eligible ones
//! to the renderer as one batch job.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;

use certgen_core::codes::serial_prefix;
use certgen_core::document_status::DocumentStatus;
use certgen_core::error::CoreError;
use certgen_core::types::{DbId, JobId};
use certgen_db::models::document::Document;
use certgen_db::models::event::Event;
use certgen_db::models::participant::UserDetail;
use certgen_db::models::template::Template;
use certgen_db::repositories::{DocumentRepo, EventRepo, ParticipantRepo, TemplateRepo};
use certgen_transport::JobTransport;

use crate::allocator::{CodeAllocator, DocumentDraft};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::request_builder::{build_batch_request, BatchContext, QrOverrides};
use crate::transition::transition_documents;

/// Action discriminator for certificate generation.
pub const ACTION_GENERATE_CERTIFICATES: &str = "generate_certificates";

/// Supported generation actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationAction {
    GenerateCertificates,
}

impl FromStr for GenerationAction {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ACTION_GENERATE_CERTIFICATES => Ok(Self::GenerateCertificates),
            other => Err(PipelineError::UnsupportedAction(other.to_string())),
        }
    }
}

/// Result of one generation action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    /// `None` when nothing was eligible for rendering.
    pub job_id: Option<JobId>,
    /// Documents inserted by this call.
    pub created: u32,
    /// Targets that already had a document.
    pub skipped: u32,
    /// Pre-existing documents re-handed to the renderer.
    pub updated: u32,
}

/// Drives generation actions against the database and the job transport.
pub struct JobOrchestrator {
    pool: PgPool,
    transport: Arc<dyn JobTransport>,
    config: Arc<PipelineConfig>,
}

impl JobOrchestrator {
    pub fn new(pool: PgPool, transport: Arc<dyn JobTransport>, config: Arc<PipelineConfig>) -> Self {
        Self {
            pool,
            transport,
            config,
        }
    }

    /// Run a generation action for an event.
    ///
    /// `participant_filter` narrows the roster; `None` or an empty list means
    /// every registered participant. IDs not on the roster are ignored.
    pub async fn run_action(
        &self,
        event_id: DbId,
        action: &str,
        participant_filter: Option<&[DbId]>,
    ) -> Result<ActionOutcome, PipelineError> {
        self.run_action_with(event_id, action, participant_filter, &QrOverrides::default())
            .await
    }

    /// [`run_action`](Self::run_action) with caller-supplied QR overrides.
    pub async fn run_action_with(
        &self,
        event_id: DbId,
        action: &str,
        participant_filter: Option<&[DbId]>,
        overrides: &QrOverrides,
    ) -> Result<ActionOutcome, PipelineError> {
        match action.parse::<GenerationAction>()? {
            GenerationAction::GenerateCertificates => {
                self.generate_certificates(event_id, participant_filter, overrides)
                    .await
            }
        }
    }

    async fn generate_certificates(
        &self,
        event_id: DbId,
        participant_filter: Option<&[DbId]>,
        overrides: &QrOverrides,
    ) -> Result<ActionOutcome, PipelineError> {
        let event = EventRepo::find_by_id(&self.pool, event_id)
            .await?
            .ok_or(PipelineError::EventNotFound(event_id))?;
        let template_id = event
            .template_id
            .ok_or(PipelineError::MissingTemplate(event_id))?;
        let template = TemplateRepo::find_by_id(&self.pool, template_id)
            .await?
            .ok_or(PipelineError::MissingTemplate(event_id))?;

        let roster = EventRepo::participant_ids(&self.pool, event_id).await?;
        let targets = resolve_targets(&roster, participant_filter);
        if targets.is_empty() {
            return Err(PipelineError::NoValidParticipants(event_id));
        }
        let prefix = serial_prefix(&event.code, &template.series)?;

        let (created_ids, skipped) = self
            .create_missing_documents(&event, &template, &targets, prefix)
            .await?;

        let (job_id, enqueued) = self
            .enqueue_eligible(&event, &template, &targets, overrides)
            .await?;
        let updated = enqueued.iter().filter(|id| !created_ids.contains(id)).count();

        let outcome = ActionOutcome {
            job_id,
            created: created_ids.len() as u32,
            skipped,
            updated: updated as u32,
        };
        tracing::info!(
            event_id,
            job_id = ?outcome.job_id,
            created = outcome.created,
            skipped = outcome.skipped,
            updated = outcome.updated,
            "Generation action completed",
        );
        Ok(outcome)
    }

    /// Insert a `CREATED` document for every target that has none yet.
    ///
    /// All-or-nothing: an allocation failure rolls back the whole batch.
    async fn create_missing_documents(
        &self,
        event: &Event,
        template: &Template,
        targets: &[DbId],
        prefix: String,
    ) -> Result<(HashSet<DbId>, u32), PipelineError> {
        let mut tx = self.pool.begin().await?;
        EventRepo::lock_for_update(&mut tx, event.id)
            .await?
            .ok_or(PipelineError::EventNotFound(event.id))?;

        let existing: HashSet<DbId> =
            DocumentRepo::find_for_participants(&mut tx, event.id, template.id, targets)
                .await?
                .into_iter()
                .map(|d| d.user_detail_id)
                .collect();

        let missing: Vec<DbId> = targets
            .iter()
            .copied()
            .filter(|id| !existing.contains(id))
            .collect();
        let skipped = (targets.len() - missing.len()) as u32;

        let mut created = HashSet::with_capacity(missing.len());
        if !missing.is_empty() {
            let mut allocator = CodeAllocator::start(
                &mut tx,
                prefix,
                self.config.serial_pad_width,
                self.config.serial_max_attempts,
            )
            .await?;
            for user_detail_id in missing {
                let draft = DocumentDraft {
                    event_id: event.id,
                    user_detail_id,
                    template_id: template.id,
                    is_public: template.is_public,
                };
                let doc = allocator.insert(&mut tx, &draft).await?;
                tracing::debug!(
                    document_id = doc.id,
                    serial = %doc.serial_code,
                    "Document created",
                );
                created.insert(doc.id);
            }
        }

        tx.commit().await?;
        Ok((created, skipped))
    }

    /// Publish one batch job for every target document in `CREATED` or
    /// `RENEW`, then mark them `PDF_PENDING`.
    ///
    /// The status write commits only after the publish succeeded; a failed
    /// publish leaves every document where it was.
    async fn enqueue_eligible(
        &self,
        event: &Event,
        template: &Template,
        targets: &[DbId],
        overrides: &QrOverrides,
    ) -> Result<(Option<JobId>, Vec<DbId>), PipelineError> {
        let mut tx = self.pool.begin().await?;
        let docs = DocumentRepo::lock_enqueueable(&mut tx, event.id, template.id, targets).await?;
        if docs.is_empty() {
            tx.commit().await?;
            return Ok((None, Vec::new()));
        }

        let user_ids: Vec<DbId> = docs.iter().map(|d| d.user_detail_id).collect();
        let users: HashMap<DbId, UserDetail> = ParticipantRepo::find_by_ids(&self.pool, &user_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();
        let field_keys = TemplateRepo::field_keys(&self.pool, template.id).await?;

        let entries: Vec<(&Document, &UserDetail)> = docs
            .iter()
            .filter_map(|doc| match users.get(&doc.user_detail_id) {
                Some(user) => Some((doc, user)),
                None => {
                    tracing::warn!(
                        document_id = doc.id,
                        user_detail_id = doc.user_detail_id,
                        "Participant record missing, document left unqueued",
                    );
                    None
                }
            })
            .collect();
        if entries.is_empty() {
            tx.commit().await?;
            return Ok((None, Vec::new()));
        }

        let job_id = uuid::Uuid::new_v4();
        let ctx = BatchContext {
            event,
            template,
            field_keys: &field_keys,
            verification_base_url: &self.config.verification_base_url,
            issued_on: Utc::now().date_naive(),
            overrides,
        };
        let request = build_batch_request(job_id, &ctx, &entries);

        self.transport
            .create_job_meta(
                job_id,
                Some(event.id),
                request.items.len() as i32,
                self.config.job_ttl,
            )
            .await?;
        self.transport
            .publish(&self.config.render_queue_name, &request)
            .await?;

        let queued: Vec<Document> = entries.iter().map(|(doc, _)| (*doc).clone()).collect();
        transition_documents(&mut tx, &queued, DocumentStatus::PdfPending, Some(job_id)).await?;
        tx.commit().await?;

        tracing::info!(
            %job_id,
            event_id = event.id,
            items = queued.len(),
            queue = %self.config.render_queue_name,
            "Batch render job published",
        );
        Ok((Some(job_id), queued.iter().map(|d| d.id).collect()))
    }

    /// Move documents back to `RENEW` so the next generation action
    /// re-renders them.
    ///
    /// Every document must exist and allow the transition; otherwise
    /// nothing is written.
    pub async fn renew_documents(&self, document_ids: &[DbId]) -> Result<u64, PipelineError> {
        let mut ids = document_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut tx = self.pool.begin().await?;
        let docs = DocumentRepo::lock_by_ids(&mut tx, &ids).await?;
        if let Some(missing) = ids.iter().find(|id| !docs.iter().any(|d| d.id == **id)) {
            return Err(CoreError::NotFound {
                entity: "document",
                id: *missing,
            }
            .into());
        }
        let renewed = transition_documents(&mut tx, &docs, DocumentStatus::Renew, None).await?;
        tx.commit().await?;

        tracing::info!(count = renewed, "Documents marked for renewal");
        Ok(renewed)
    }
}

/// Intersect the roster with an optional filter, keeping roster order and
/// dropping duplicates.
pub fn resolve_targets(roster: &[DbId], filter: Option<&[DbId]>) -> Vec<DbId> {
    let mut seen = HashSet::with_capacity(roster.len());
    match filter {
        Some(ids) if !ids.is_empty() => {
            let wanted: HashSet<DbId> = ids.iter().copied().collect();
            roster
                .iter()
                .copied()
                .filter(|id| wanted.contains(id) && seen.insert(*id))
                .collect()
        }
        _ => roster.iter().copied().filter(|id| seen.insert(*id)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn action_names_parse() {
        assert_eq!(
            "generate_certificates".parse::<GenerationAction>().unwrap(),
            GenerationAction::GenerateCertificates
        );
        assert_matches!(
            "delete_everything".parse::<GenerationAction>(),
            Err(PipelineError::UnsupportedAction(name)) if name == "delete_everything"
        );
    }

    #[test]
    fn no_filter_means_whole_roster() {
        assert_eq!(resolve_targets(&[4, 2, 9], None), vec![4, 2, 9]);
        assert_eq!(resolve_targets(&[4, 2, 9], Some(&[])), vec![4, 2, 9]);
    }

    #[test]
    fn filter_drops_strangers_and_duplicates() {
        assert_eq!(resolve_targets(&[4, 2, 9], Some(&[9, 9, 77, 4])), vec![4, 9]);
    }

    #[test]
    fn filter_with_only_strangers_is_empty() {
        assert!(resolve_targets(&[4, 2], Some(&[100, 101])).is_empty());
    }
}
