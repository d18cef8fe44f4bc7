//! Certificate generation domain core.
//!
//! Zero-IO building blocks shared by the persistence, transport, and
//! pipeline crates: id aliases, the domain error type, the document
//! lifecycle state machine, and serial/verification code generation.

pub mod codes;
pub mod document_status;
pub mod error;
pub mod types;
