//! Job transport for batch render requests.
//!
//! The orchestrator publishes one [`BatchRenderRequest`] per batch and the
//! external renderer reports back through per-item result/error lines and
//! a [`CompletionNotification`]. [`JobTransport`] is the capability both the
//! orchestrator and the reconciler receive at construction; it is treated as
//! at-least-once and never authoritative.
//!
//! Two implementations ship with the crate:
//!
//! - [`PgJobTransport`]: tables in the application database, consumer
//!   claims via `FOR UPDATE SKIP LOCKED`, wake-ups via `LISTEN/NOTIFY`.
//! - [`InMemoryJobTransport`]: single-process, used by tests and local runs.

pub mod error;
pub mod memory;
pub mod messages;
pub mod postgres;
pub mod transport;

pub use error::TransportError;
pub use memory::InMemoryJobTransport;
pub use messages::{
    BatchRenderRequest, CompletionNotification, ErrorRecord, JobMeta, JobState, KeyValue,
    PdfField, RecordError, RenderItem, ResultRecord, JOB_TYPE_GENERATE_DOCS,
};
pub use postgres::PgJobTransport;
pub use transport::JobTransport;
