#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use certgen_core::document_status::DocumentStatus;
use certgen_core::types::{DbId, JobId};
use certgen_db::models::document::Document;
use certgen_db::models::event::{CreateEvent, Event};
use certgen_db::models::participant::{CreateUserDetail, UserDetail};
use certgen_db::models::template::{CreateTemplate, Template};
use certgen_db::repositories::{DocumentRepo, EventRepo, ParticipantRepo, TemplateRepo};
use certgen_pipeline::{CompletionReconciler, JobOrchestrator, PipelineConfig};
use certgen_transport::{InMemoryJobTransport, JobTransport};

pub const ACTION: &str = "generate_certificates";

/// An event with a template and a registered roster.
pub struct Seeded {
    pub event: Event,
    pub template: Template,
    pub participants: Vec<UserDetail>,
}

impl Seeded {
    pub fn participant_ids(&self) -> Vec<DbId> {
        self.participants.iter().map(|p| p.id).collect()
    }
}

/// Pipeline config for tests: short poll, default policy.
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        verification_base_url: "https://verify.test/v/".to_string(),
        reconcile_poll_timeout: Duration::from_millis(50),
        ..PipelineConfig::default()
    }
}

pub async fn seed_event(pool: &PgPool, code: &str, participants: usize) -> Seeded {
    let template = TemplateRepo::create(
        pool,
        &CreateTemplate {
            name: format!("{code} attendance"),
            series: "A".to_string(),
            file_ref: "templates/attendance.pdf".to_string(),
            is_public: true,
            field_keys: vec!["participant_name".to_string(), "date".to_string()],
        },
    )
    .await
    .unwrap();

    let event = EventRepo::create(
        pool,
        &CreateEvent {
            code: code.to_string(),
            name: format!("{code} conference"),
            template_id: Some(template.id),
        },
    )
    .await
    .unwrap();

    let mut people = Vec::with_capacity(participants);
    for n in 0..participants {
        let person = ParticipantRepo::create(
            pool,
            &CreateUserDetail {
                full_name: format!("Participant {n}"),
                email: Some(format!("p{n}@{code}.test").to_lowercase()),
            },
        )
        .await
        .unwrap();
        EventRepo::add_participant(pool, event.id, person.id).await.unwrap();
        people.push(person);
    }

    Seeded {
        event,
        template,
        participants: people,
    }
}

pub fn transport() -> Arc<InMemoryJobTransport> {
    Arc::new(InMemoryJobTransport::new())
}

pub fn orchestrator(pool: &PgPool, transport: Arc<InMemoryJobTransport>) -> JobOrchestrator {
    let transport: Arc<dyn JobTransport> = transport;
    JobOrchestrator::new(pool.clone(), transport, Arc::new(test_config()))
}

pub fn reconciler(pool: &PgPool, transport: Arc<InMemoryJobTransport>) -> CompletionReconciler {
    let transport: Arc<dyn JobTransport> = transport;
    CompletionReconciler::new(pool.clone(), transport, Arc::new(test_config()))
}

/// A well-formed renderer success line for a document.
pub fn result_line(document_id: DbId) -> String {
    format!(
        r#"{{"client_ref":"{document_id}","file_id":"{}","file_name":"{document_id}.pdf","file_size_bytes":1024}}"#,
        uuid::Uuid::new_v4()
    )
}

pub fn error_line(document_id: DbId, message: &str) -> String {
    format!(r#"{{"client_ref":"{document_id}","error":"{message}"}}"#)
}

pub async fn documents(pool: &PgPool, event_id: DbId) -> Vec<Document> {
    DocumentRepo::list_by_event(pool, event_id).await.unwrap()
}

pub async fn status_of(pool: &PgPool, document_id: DbId) -> DocumentStatus {
    DocumentRepo::find_by_id(pool, document_id)
        .await
        .unwrap()
        .expect("document exists")
        .status()
        .unwrap()
}

pub async fn job_documents(pool: &PgPool, job_id: JobId) -> Vec<Document> {
    DocumentRepo::list_by_job(pool, job_id).await.unwrap()
}
