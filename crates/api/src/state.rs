use std::sync::Arc;

use certgen_pipeline::JobOrchestrator;
use certgen_transport::JobTransport;

use crate::config::ServerConfig;

/// Shared application state available to all handlers via `State<AppState>`.
///
/// Cheap to clone; everything heavy sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: certgen_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Job transport, used for progress lookups.
    pub transport: Arc<dyn JobTransport>,
    /// Generation action entrypoint.
    pub orchestrator: Arc<JobOrchestrator>,
}
