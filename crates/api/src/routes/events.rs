use axum::routing::{get, post};
use axum::Router;

use crate::handlers::events;
use crate::state::AppState;

/// Routes mounted at `/events`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/actions", post(events::run_action))
        .route("/{id}/documents/summary", get(events::document_summary))
}
