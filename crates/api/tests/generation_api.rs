//! HTTP-level tests for generation actions, job progress, verification,
//! and renewal.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::Router;
use serde_json::json;
use sqlx::PgPool;

use certgen_core::types::{DbId, JobId};
use certgen_db::repositories::DocumentRepo;
use certgen_pipeline::{CompletionReconciler, PipelineConfig, ReconcileOutcome};
use certgen_transport::{InMemoryJobTransport, JobState, JobTransport};

use common::{body_json, get, post_json};

fn actions_uri(event_id: DbId) -> String {
    format!("/api/v1/events/{event_id}/actions")
}

/// Run the generation action over HTTP and return the job id.
async fn generate(app: &Router, event_id: DbId) -> JobId {
    let response = post_json(
        app.clone(),
        &actions_uri(event_id),
        json!({"action": "generate_certificates"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    json["data"]["job_id"].as_str().unwrap().parse().unwrap()
}

/// Play the renderer: every item succeeds, then reconcile.
async fn render_all(pool: &PgPool, transport: &Arc<InMemoryJobTransport>, job_id: JobId) {
    let request = transport
        .claim_next("certgen.render.requests")
        .await
        .expect("published request");
    for item in &request.items {
        transport
            .append_result(
                job_id,
                format!(
                    r#"{{"client_ref":"{}","file_id":"{}","file_name":"cert.pdf"}}"#,
                    item.client_ref,
                    uuid::Uuid::new_v4()
                ),
            )
            .await;
    }
    transport.finish(job_id, JobState::Done).await.unwrap();

    let dyn_transport: Arc<dyn JobTransport> = transport.clone();
    let outcome = CompletionReconciler::new(
        pool.clone(),
        dyn_transport,
        Arc::new(PipelineConfig::default()),
    )
    .reconcile_job(job_id)
    .await
    .unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Applied(_)));
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_generate_returns_counts_and_job(pool: PgPool) {
    let (event_id, _) = common::seed_event(&pool, "APIGEN", 3).await;
    let (app, transport) = common::build_test_app(pool.clone());

    let response = post_json(
        app,
        &actions_uri(event_id),
        json!({"action": "generate_certificates"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["created"], 3);
    assert_eq!(json["data"]["skipped"], 0);
    assert_eq!(json["data"]["updated"], 0);
    assert!(json["data"]["job_id"].is_string());
    assert_eq!(transport.published().await.len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_rerun_returns_ok_without_job(pool: PgPool) {
    let (event_id, _) = common::seed_event(&pool, "APIRERUN", 2).await;
    let (app, _) = common::build_test_app(pool);
    generate(&app, event_id).await;

    let response = post_json(
        app,
        &actions_uri(event_id),
        json!({"action": "generate_certificates"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["data"]["job_id"].is_null());
    assert_eq!(json["data"]["skipped"], 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_participant_filter_and_qr_overrides(pool: PgPool) {
    let (event_id, people) = common::seed_event(&pool, "APIFILTER", 3).await;
    let (app, transport) = common::build_test_app(pool);

    let response = post_json(
        app,
        &actions_uri(event_id),
        json!({
            "action": "generate_certificates",
            "participant_ids": [people[1]],
            "qr": [{"key": "size", "value": 512}],
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let published = transport.published().await;
    let items = &published[0].1.items;
    assert_eq!(items.len(), 1);
    let size = items[0]
        .qr
        .iter()
        .rev()
        .find(|kv| kv.key == "size")
        .unwrap();
    assert_eq!(size.value, json!(512));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_unsupported_action_is_rejected(pool: PgPool) {
    let (event_id, _) = common::seed_event(&pool, "APIBAD", 1).await;
    let (app, transport) = common::build_test_app(pool);

    let response = post_json(app, &actions_uri(event_id), json!({"action": "send_emails"})).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(transport.published().await.is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_unknown_event_is_404(pool: PgPool) {
    let (app, _) = common::build_test_app(pool);
    let response = post_json(
        app,
        &actions_uri(999_999),
        json!({"action": "generate_certificates"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_filter_outside_roster_is_rejected(pool: PgPool) {
    let (event_id, _) = common::seed_event(&pool, "APIROSTER", 2).await;
    let (app, _) = common::build_test_app(pool);

    let response = post_json(
        app,
        &actions_uri(event_id),
        json!({"action": "generate_certificates", "participant_ids": [999_999]}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_publish_failure_is_service_unavailable(pool: PgPool) {
    let (event_id, _) = common::seed_event(&pool, "APIDOWN", 2).await;
    let (app, transport) = common::build_test_app(pool.clone());
    transport.set_fail_publish(true);

    let response = post_json(
        app,
        &actions_uri(event_id),
        json!({"action": "generate_certificates"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["code"], "TRANSPORT_UNAVAILABLE");
    // Documents were still created and wait for the next run.
    let docs = DocumentRepo::list_by_event(&pool, event_id).await.unwrap();
    assert_eq!(docs.len(), 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_document_summary_counts_statuses(pool: PgPool) {
    let (event_id, _) = common::seed_event(&pool, "APISUM", 2).await;
    let (app, _) = common::build_test_app(pool);
    generate(&app, event_id).await;

    let response = get(app, &format!("/api/v1/events/{event_id}/documents/summary")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(
        json["data"],
        json!([{"status": "PDF_PENDING", "count": 2}])
    );
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_job_progress_lists_documents(pool: PgPool) {
    let (event_id, _) = common::seed_event(&pool, "APIJOB", 2).await;
    let (app, transport) = common::build_test_app(pool.clone());
    let job_id = generate(&app, event_id).await;

    let response = get(app.clone(), &format!("/api/v1/jobs/{job_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["job_id"], job_id.to_string());
    assert_eq!(json["data"]["event_id"], event_id);
    assert_eq!(json["data"]["total_items"], 2);
    assert_eq!(json["data"]["status"], "QUEUED");
    let documents = json["data"]["documents"].as_array().unwrap();
    assert_eq!(documents.len(), 2);
    assert!(documents.iter().all(|d| d["status"] == "PDF_PENDING"));

    render_all(&pool, &transport, job_id).await;

    let json = body_json(get(app, &format!("/api/v1/jobs/{job_id}")).await).await;
    assert_eq!(json["data"]["status"], "DONE");
    assert_eq!(json["data"]["processed_items"], 2);
    let documents = json["data"]["documents"].as_array().unwrap();
    assert!(documents.iter().all(|d| d["status"] == "PDF_COMPLETED"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_unknown_job_is_404(pool: PgPool) {
    let (app, _) = common::build_test_app(pool);
    let response = get(app, &format!("/api/v1/jobs/{}", uuid::Uuid::new_v4())).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

async fn first_document(pool: &PgPool, event_id: DbId) -> (DbId, String) {
    let docs = DocumentRepo::list_by_event(pool, event_id).await.unwrap();
    (docs[0].id, docs[0].verification_code.clone())
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_verify_shows_latest_artifact(pool: PgPool) {
    let (event_id, _) = common::seed_event(&pool, "APIVERIFY", 1).await;
    let (app, transport) = common::build_test_app(pool.clone());
    let job_id = generate(&app, event_id).await;
    let (id, code) = first_document(&pool, event_id).await;

    let uri = format!("/api/v1/documents/verify/{code}");
    let json = body_json(get(app.clone(), &uri).await).await;
    assert_eq!(json["data"]["id"], id);
    assert_eq!(json["data"]["status"], "PDF_PENDING");
    assert!(json["data"]["latest_pdf"].is_null());

    render_all(&pool, &transport, job_id).await;

    let response = get(app, &uri).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "PDF_COMPLETED");
    assert_eq!(json["data"]["latest_pdf"]["version"], 1);
    assert_eq!(json["data"]["latest_pdf"]["render_job_id"], job_id.to_string());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_verify_unknown_code_is_404(pool: PgPool) {
    let (app, _) = common::build_test_app(pool);
    let response = get(app, "/api/v1/documents/verify/CERT-NQSUCHCDE2").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_verify_malformed_code_is_rejected(pool: PgPool) {
    let (app, _) = common::build_test_app(pool);

    for uri in [
        "/api/v1/documents/verify/not-a-code",
        "/api/v1/documents/verify/CERT-ABC",
        // Lookalike characters never appear in issued codes.
        "/api/v1/documents/verify/CERT-ABCDEFGH0K",
    ] {
        let response = get(app.clone(), uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_renew_completed_document_requeues_it(pool: PgPool) {
    let (event_id, _) = common::seed_event(&pool, "APIRENEW", 2).await;
    let (app, transport) = common::build_test_app(pool.clone());
    let job_id = generate(&app, event_id).await;
    let (id, _) = first_document(&pool, event_id).await;

    // Still pending: renewal is a rejected transition.
    let response = post_json(
        app.clone(),
        "/api/v1/documents/renew",
        json!({"document_ids": [id]}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "INVALID_TRANSITION");

    render_all(&pool, &transport, job_id).await;

    let response = post_json(
        app.clone(),
        "/api/v1/documents/renew",
        json!({"document_ids": [id]}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["renewed"], 1);

    let response = post_json(
        app,
        &actions_uri(event_id),
        json!({"action": "generate_certificates"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["created"], 0);
    assert_eq!(json["data"]["skipped"], 2);
    assert_eq!(json["data"]["updated"], 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_renew_validates_input(pool: PgPool) {
    let (app, _) = common::build_test_app(pool);

    let empty = post_json(
        app.clone(),
        "/api/v1/documents/renew",
        json!({"document_ids": []}),
    )
    .await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let missing = post_json(
        app,
        "/api/v1/documents/renew",
        json!({"document_ids": [999_999]}),
    )
    .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
