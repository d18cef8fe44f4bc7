#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use certgen_api::app::build_app;
use certgen_api::config::ServerConfig;
use certgen_api::state::AppState;
use certgen_core::types::DbId;
use certgen_db::models::event::CreateEvent;
use certgen_db::models::participant::CreateUserDetail;
use certgen_db::models::template::CreateTemplate;
use certgen_db::repositories::{EventRepo, ParticipantRepo, TemplateRepo};
use certgen_pipeline::{JobOrchestrator, PipelineConfig};
use certgen_transport::{InMemoryJobTransport, JobTransport};

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
    }
}

/// Build the full application router over an in-memory transport.
///
/// Returns the transport so tests can play the renderer.
pub fn build_test_app(pool: PgPool) -> (Router, Arc<InMemoryJobTransport>) {
    let memory = Arc::new(InMemoryJobTransport::new());
    let transport: Arc<dyn JobTransport> = memory.clone();
    let pipeline = Arc::new(PipelineConfig {
        verification_base_url: "https://verify.test/v/".to_string(),
        reconcile_poll_timeout: Duration::from_millis(50),
        ..PipelineConfig::default()
    });
    let orchestrator = Arc::new(JobOrchestrator::new(
        pool.clone(),
        Arc::clone(&transport),
        pipeline,
    ));

    let state = AppState {
        pool,
        config: Arc::new(test_config()),
        transport,
        orchestrator,
    };
    (build_app(state), memory)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Seed data
// ---------------------------------------------------------------------------

/// Create an event with a template and `participants` registered people.
/// Returns the event id and the participant ids in roster order.
pub async fn seed_event(pool: &PgPool, code: &str, participants: usize) -> (DbId, Vec<DbId>) {
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

    let mut ids = Vec::with_capacity(participants);
    for n in 0..participants {
        let person = ParticipantRepo::create(
            pool,
            &CreateUserDetail {
                full_name: format!("Participant {n}"),
                email: None,
            },
        )
        .await
        .unwrap();
        EventRepo::add_participant(pool, event.id, person.id).await.unwrap();
        ids.push(person.id);
    }

    (event.id, ids)
}
