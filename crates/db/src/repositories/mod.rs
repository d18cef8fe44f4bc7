//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` or an open `Transaction` as the first argument.

pub mod document_repo;
pub mod event_repo;
pub mod generated_pdf_repo;
pub mod participant_repo;
pub mod render_job_repo;
pub mod template_repo;

pub use document_repo::DocumentRepo;
pub use event_repo::EventRepo;
pub use generated_pdf_repo::GeneratedPdfRepo;
pub use participant_repo::ParticipantRepo;
pub use render_job_repo::RenderJobRepo;
pub use template_repo::TemplateRepo;
