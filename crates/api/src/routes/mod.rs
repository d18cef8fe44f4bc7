pub mod documents;
pub mod events;
pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /events
///     POST   /{id}/actions              -> run_action
///     GET    /{id}/documents/summary    -> document_summary
/// /jobs
///     GET    /{job_id}                  -> get_job
/// /documents
///     GET    /verify/{code}             -> verify
///     POST   /renew                     -> renew
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/events", events::router())
        .nest("/jobs", jobs::router())
        .nest("/documents", documents::router())
}
