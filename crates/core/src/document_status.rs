//! Document lifecycle state machine.
//!
//! Every status write goes through [`DocumentStatus::validate_transition`].
//! Discriminants match the seed order of the `document_statuses` lookup
//! table (1-based, SMALLINT).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

/// Lifecycle status of a certificate document.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Created = 1,
    PdfPending = 2,
    PdfDownloading = 3,
    PdfDownloaded = 4,
    PdfRendering = 5,
    PdfRendered = 6,
    PdfGeneratingQr = 7,
    PdfQrGenerated = 8,
    PdfInsertingQr = 9,
    PdfQrInserted = 10,
    PdfUploading = 11,
    PdfCompleted = 12,
    PdfFailed = 13,
    Rejected = 14,
    Renew = 15,
}

/// The renderer pipeline in order, from queued to uploaded.
///
/// Each stage may only advance to the next one (or fail).
const PIPELINE: [DocumentStatus; 11] = [
    DocumentStatus::PdfPending,
    DocumentStatus::PdfDownloading,
    DocumentStatus::PdfDownloaded,
    DocumentStatus::PdfRendering,
    DocumentStatus::PdfRendered,
    DocumentStatus::PdfGeneratingQr,
    DocumentStatus::PdfQrGenerated,
    DocumentStatus::PdfInsertingQr,
    DocumentStatus::PdfQrInserted,
    DocumentStatus::PdfUploading,
    DocumentStatus::PdfCompleted,
];

impl DocumentStatus {
    /// Every status, in discriminant order.
    pub const ALL: [DocumentStatus; 15] = [
        Self::Created,
        Self::PdfPending,
        Self::PdfDownloading,
        Self::PdfDownloaded,
        Self::PdfRendering,
        Self::PdfRendered,
        Self::PdfGeneratingQr,
        Self::PdfQrGenerated,
        Self::PdfInsertingQr,
        Self::PdfQrInserted,
        Self::PdfUploading,
        Self::PdfCompleted,
        Self::PdfFailed,
        Self::Rejected,
        Self::Renew,
    ];

    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Resolve a database status ID. Unknown ids yield `None`.
    pub fn from_id(id: StatusId) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    /// Canonical upper-case name, e.g. `PDF_PENDING`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::PdfPending => "PDF_PENDING",
            Self::PdfDownloading => "PDF_DOWNLOADING",
            Self::PdfDownloaded => "PDF_DOWNLOADED",
            Self::PdfRendering => "PDF_RENDERING",
            Self::PdfRendered => "PDF_RENDERED",
            Self::PdfGeneratingQr => "PDF_GENERATING_QR",
            Self::PdfQrGenerated => "PDF_QR_GENERATED",
            Self::PdfInsertingQr => "PDF_INSERTING_QR",
            Self::PdfQrInserted => "PDF_QR_INSERTED",
            Self::PdfUploading => "PDF_UPLOADING",
            Self::PdfCompleted => "PDF_COMPLETED",
            Self::PdfFailed => "PDF_FAILED",
            Self::Rejected => "REJECTED",
            Self::Renew => "RENEW",
        }
    }

    /// Statuses this one may move to.
    pub fn allowed_targets(self) -> Vec<DocumentStatus> {
        match self {
            Self::Created | Self::Renew => vec![Self::PdfPending, Self::Rejected],
            Self::PdfCompleted => vec![Self::Rejected, Self::Renew],
            Self::PdfFailed => vec![Self::Renew, Self::Rejected],
            Self::Rejected => vec![Self::Renew],
            stage => {
                // In-flight renderer stage: advance one step or fail.
                let pos = PIPELINE.iter().position(|s| *s == stage);
                let mut targets = Vec::with_capacity(2);
                if let Some(next) = pos.and_then(|p| PIPELINE.get(p + 1)) {
                    targets.push(*next);
                }
                targets.push(Self::PdfFailed);
                targets
            }
        }
    }

    pub fn can_transition_to(self, to: DocumentStatus) -> bool {
        self.allowed_targets().contains(&to)
    }

    /// Check a single transition against the table.
    pub fn validate_transition(self, to: DocumentStatus) -> Result<(), CoreError> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition { from: self, to })
        }
    }

    /// Walk the renderer pipeline from `self` to `PDF_COMPLETED`.
    ///
    /// Batch completion reports only the final outcome, so intermediate
    /// stages are replayed hop by hop. Every hop is checked against the
    /// table; the returned vector ends with `PdfCompleted`.
    pub fn completion_path(self) -> Result<Vec<DocumentStatus>, CoreError> {
        let mut path = Vec::new();
        let mut current = self;
        while current != Self::PdfCompleted {
            let next = PIPELINE
                .iter()
                .position(|s| *s == current)
                .and_then(|p| PIPELINE.get(p + 1).copied())
                .ok_or(CoreError::InvalidTransition {
                    from: current,
                    to: Self::PdfCompleted,
                })?;
            current.validate_transition(next)?;
            path.push(next);
            current = next;
        }
        if path.is_empty() {
            return Err(CoreError::InvalidTransition {
                from: self,
                to: Self::PdfCompleted,
            });
        }
        Ok(path)
    }

    /// Queued or somewhere inside the renderer pipeline, before completion.
    pub fn is_pending_family(self) -> bool {
        PIPELINE[..PIPELINE.len() - 1].contains(&self)
    }

    /// May be handed to the renderer by a generation action.
    pub fn is_enqueueable(self) -> bool {
        matches!(self, Self::Created | Self::Renew)
    }

    /// No automated transition is expected from here.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::PdfCompleted | Self::PdfFailed | Self::Rejected)
    }

    /// Database ids of every pending-family status, for `= ANY($n)` binds.
    pub fn pending_family_ids() -> Vec<StatusId> {
        Self::ALL
            .into_iter()
            .filter(|s| s.is_pending_family())
            .map(Self::id)
            .collect()
    }
}

impl From<DocumentStatus> for StatusId {
    fn from(value: DocumentStatus) -> Self {
        value as StatusId
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::Validation(format!("Unknown document status '{s}'")))
    }
}
