//! Domain model structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row and, where rows are inserted by this workspace, a
//! create DTO.

pub mod document;
pub mod event;
pub mod generated_pdf;
pub mod participant;
pub mod render_job;
pub mod template;
