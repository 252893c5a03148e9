//! Persistence errors.

use rapport_core::errors::LiveError;
use thiserror::Error;

/// Errors from a persistence collaborator.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backend refused the write.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer in time.
    #[error("append timed out after {0:?}")]
    TimedOut(std::time::Duration),

    /// The writer task is gone.
    #[error("persistence writer closed")]
    Closed,
}

impl From<PersistenceError> for LiveError {
    fn from(e: PersistenceError) -> Self {
        LiveError::Persistence(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use rapport_core::errors::codes;

    use super::*;

    #[test]
    fn maps_to_persistence_failure() {
        let e: LiveError = PersistenceError::Unavailable("disk full".into()).into();
        assert_eq!(e.code(), codes::PERSISTENCE_FAILURE);
        assert!(!e.is_fatal());
    }

    #[test]
    fn io_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let e = PersistenceError::from(io);
        assert!(e.to_string().contains("nope"));
    }
}
