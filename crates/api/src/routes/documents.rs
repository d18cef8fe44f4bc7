use axum::routing::{get, post};
use axum::Router;

use crate::handlers::documents;
use crate::state::AppState;

/// Routes mounted at `/documents`.
///
/// ```text
/// GET    /verify/{code}    -> verify
/// POST   /renew            -> renew
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/verify/{code}", get(documents::verify))
        .route("/renew", post(documents::renew))
}
