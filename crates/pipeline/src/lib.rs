//! Certificate document-generation pipeline.
//!
//! - [`orchestrator::JobOrchestrator`] creates documents for an event and
//!   publishes one batch render request per action.
//! - [`reconciler::CompletionReconciler`] applies finished batch jobs back
//!   onto documents exactly once.
//! - [`sweeper::AbandonedJobSweeper`] closes out documents whose job
//!   vanished or whose completion signal was lost.
//!
//! All three receive the same `Arc<dyn JobTransport>` and `PgPool`; the
//! database is the single source of truth.

pub mod allocator;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod reconciler;
pub mod request_builder;
pub mod sweeper;
pub mod transition;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use orchestrator::{ActionOutcome, GenerationAction, JobOrchestrator};
pub use reconciler::{CompletionReconciler, ReconcileOutcome, ReconcileReport};
pub use sweeper::{AbandonedJobSweeper, SweepReport};
