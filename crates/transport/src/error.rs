use certgen_core::types::JobId;

/// Errors raised by a [`JobTransport`](crate::JobTransport) implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The backing database failed.
    #[error("Transport database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A payload could not be encoded or decoded.
    #[error("Transport serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Job metadata is missing or has expired.
    #[error("Render job not found: {0}")]
    JobNotFound(JobId),

    /// The transport refused or could not accept the operation.
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}
