//! Wire types exchanged with the external renderer.
//!
//! Requests are serialized as JSON. Result and error records arrive as raw
//! lines that are parsed one at a time so a single corrupt line never
//! poisons the rest of the job.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use certgen_core::types::{DbId, JobId, Timestamp};

/// Job type discriminator for certificate batches.
pub const JOB_TYPE_GENERATE_DOCS: &str = "GENERATE_DOCS";

// ---------------------------------------------------------------------------
// Batch request
// ---------------------------------------------------------------------------

/// An ordered key/value parameter. Duplicate keys are allowed; consumers
/// apply them in order, so the last occurrence wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: serde_json::Value,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A resolved template field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfField {
    pub key: String,
    pub value: String,
}

/// One document to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderItem {
    /// Correlation key: the document id, echoed back in result records.
    pub client_ref: String,
    pub template_ref: String,
    pub user_ref: DbId,
    pub is_public: bool,
    /// QR code generation parameters.
    pub qr: Vec<KeyValue>,
    /// QR placement parameters inside the PDF.
    pub qr_pdf: Vec<KeyValue>,
    pub pdf_fields: Vec<PdfField>,
}

/// The payload published for one batch job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRenderRequest {
    pub job_id: JobId,
    pub job_type: String,
    pub event_id: Option<DbId>,
    pub items: Vec<RenderItem>,
}

// ---------------------------------------------------------------------------
// Job metadata
// ---------------------------------------------------------------------------

/// Overall status of a batch job as reported by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Processing,
    Done,
    DoneWithErrors,
    Failed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Processing => "PROCESSING",
            Self::Done => "DONE",
            Self::DoneWithErrors => "DONE_WITH_ERRORS",
            Self::Failed => "FAILED",
        }
    }

    /// The renderer has finished with the job, successfully or not.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::DoneWithErrors | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(Self::Queued),
            "PROCESSING" => Ok(Self::Processing),
            "DONE" => Ok(Self::Done),
            "DONE_WITH_ERRORS" => Ok(Self::DoneWithErrors),
            "FAILED" => Ok(Self::Failed),
            other => Err(RecordError::Invalid(format!("unknown job status '{other}'"))),
        }
    }
}

/// Job bookkeeping kept by the transport for the lifetime of its TTL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobMeta {
    pub job_id: JobId,
    pub event_id: Option<DbId>,
    pub job_type: String,
    pub total_items: i32,
    pub processed_items: i32,
    pub failed_items: i32,
    pub status: JobState,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    /// Set once the reconciler has committed this job's results.
    pub drained: bool,
}

// ---------------------------------------------------------------------------
// Notifications and per-item records
// ---------------------------------------------------------------------------

/// "Batch done" signal from the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionNotification {
    pub job_id: JobId,
    pub event_id: Option<DbId>,
    pub job_type: String,
    pub status: JobState,
}

/// Why a raw record line was dropped.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field `{0}`")]
    Missing(&'static str),

    #[error("{0}")]
    Invalid(String),
}

/// Lenient decoding target; validation happens in [`ResultRecord::parse`].
#[derive(Debug, Deserialize)]
struct RawResultRecord {
    client_ref: Option<serde_json::Value>,
    user_ref: Option<serde_json::Value>,
    file_id: Option<String>,
    file_name: Option<String>,
    file_hash: Option<String>,
    file_size_bytes: Option<i64>,
    storage_provider: Option<String>,
}

/// A validated per-item success record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    /// Document id resolved from `client_ref`.
    pub document_id: DbId,
    pub user_ref: Option<DbId>,
    pub file_id: uuid::Uuid,
    pub file_name: Option<String>,
    pub file_hash: Option<String>,
    pub file_size_bytes: Option<i64>,
    pub storage_provider: Option<String>,
}

impl ResultRecord {
    /// Parse one result line.
    ///
    /// Lines without a usable `client_ref` or with a `file_id` that is not a
    /// UUID are rejected.
    pub fn parse(line: &str) -> Result<Self, RecordError> {
        let raw: RawResultRecord = serde_json::from_str(line)?;

        let client_ref = raw.client_ref.ok_or(RecordError::Missing("client_ref"))?;
        let document_id = parse_ref(&client_ref)
            .ok_or_else(|| RecordError::Invalid(format!("unusable client_ref {client_ref}")))?;

        let file_id_raw = raw.file_id.ok_or(RecordError::Missing("file_id"))?;
        let file_id = uuid::Uuid::parse_str(file_id_raw.trim())
            .map_err(|_| RecordError::Invalid(format!("unparseable file_id '{file_id_raw}'")))?;

        Ok(Self {
            document_id,
            user_ref: raw.user_ref.as_ref().and_then(parse_ref),
            file_id,
            file_name: raw.file_name,
            file_hash: raw.file_hash,
            file_size_bytes: raw.file_size_bytes,
            storage_provider: raw.storage_provider,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawErrorRecord {
    client_ref: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// A per-item failure record. Only used for logging: unreported items are
/// failed regardless.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub document_id: Option<DbId>,
    pub error: String,
}

impl ErrorRecord {
    pub fn parse(line: &str) -> Result<Self, RecordError> {
        let raw: RawErrorRecord = serde_json::from_str(line)?;
        Ok(Self {
            document_id: raw.client_ref.as_ref().and_then(parse_ref),
            error: raw.error.unwrap_or_else(|| "unspecified renderer error".to_string()),
        })
    }
}

/// References travel as strings but some renderers echo them as numbers.
fn parse_ref(value: &serde_json::Value) -> Option<DbId> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
