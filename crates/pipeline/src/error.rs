//! Pipeline error taxonomy.

use certgen_core::error::CoreError;
use certgen_core::types::{DbId, JobId};
use certgen_transport::TransportError;

/// Failures surfaced by the orchestrator, reconciler, and sweeper.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The action discriminator is not implemented.
    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("Event not found: {0}")]
    EventNotFound(DbId),

    /// The event has no template assigned (or it was deleted).
    #[error("Event {0} has no template assigned")]
    MissingTemplate(DbId),

    /// Filtering against the roster left nobody to generate for.
    #[error("Event {0} has no valid participants for this action")]
    NoValidParticipants(DbId),

    /// Every attempt to insert a document with fresh codes collided.
    #[error("Serial allocation exhausted for prefix '{serial_prefix}' after {attempts} attempts")]
    SerialAllocationExhausted {
        serial_prefix: String,
        attempts: u32,
    },

    /// Fewer documents carry the job id than the job was published with.
    /// Retryable: the enqueue transaction may not have committed yet.
    #[error("Render job {job_id} owns {owned} of {expected} documents so far")]
    JobNotSettled {
        job_id: JobId,
        owned: usize,
        expected: usize,
    },

    /// Domain rule violation, including rejected status transitions.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl PipelineError {
    /// Rejected before any side effect.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedAction(_)
                | Self::EventNotFound(_)
                | Self::MissingTemplate(_)
                | Self::NoValidParticipants(_)
                | Self::Core(CoreError::Validation(_))
        )
    }
}
