//! Redaction errors.

use rapport_core::errors::LiveError;
use rapport_core::ids::DetectionId;
use thiserror::Error;

/// Errors from redaction operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RedactionError {
    /// Decision for a detection the service does not know.
    #[error("unknown detection: {0}")]
    UnknownDetection(DetectionId),
    /// Imported state references a detection it does not contain.
    #[error("imported decision references unknown detection {0}")]
    DanglingDecision(DetectionId),
    /// Imported state lists the same detection twice.
    #[error("duplicate detection in imported state: {0}")]
    DuplicateDetection(DetectionId),
    /// `replace` with an empty replacement string.
    #[error("replacement text must not be empty")]
    EmptyReplacement,
}

impl From<RedactionError> for LiveError {
    fn from(e: RedactionError) -> Self {
        match e {
            RedactionError::UnknownDetection(id) => LiveError::NotFound {
                kind: "detection",
                id: id.to_string(),
            },
            other => LiveError::Validation(other.to_string()),
        }
    }
}
