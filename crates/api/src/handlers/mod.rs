//! Request handlers.
//!
//! Handlers parse the request, delegate to the pipeline or a repository,
//! and map failures through [`AppError`](crate::error::AppError).

pub mod documents;
pub mod events;
pub mod jobs;
