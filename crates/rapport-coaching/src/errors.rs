//! Coaching errors.

use rapport_core::coaching::PromptResponse;
use rapport_core::errors::LiveError;
use rapport_core::ids::PromptEventId;
use thiserror::Error;

/// Errors from recording a prompt response.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoachingError {
    /// No displayed prompt with that ID.
    #[error("unknown coaching prompt: {0}")]
    UnknownPrompt(PromptEventId),
    /// The prompt already has a response.
    #[error("coaching prompt {id} already {}", existing.as_str())]
    AlreadyResponded {
        /// Prompt.
        id: PromptEventId,
        /// The response already recorded.
        existing: PromptResponse,
    },
}

impl From<CoachingError> for LiveError {
    fn from(e: CoachingError) -> Self {
        match e {
            CoachingError::UnknownPrompt(id) => LiveError::NotFound {
                kind: "coaching prompt",
                id: id.to_string(),
            },
            e @ CoachingError::AlreadyResponded { .. } => LiveError::Conflict(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use rapport_core::errors::codes;

    use super::*;

    #[test]
    fn second_response_maps_to_state_error() {
        let e: LiveError = CoachingError::AlreadyResponded {
            id: PromptEventId::from_raw("cpe_1"),
            existing: PromptResponse::Accepted,
        }
        .into();
        assert_eq!(e.code(), codes::STATE_ERROR);
        assert!(e.to_string().contains("already accepted"));
    }

    #[test]
    fn unknown_prompt_maps_to_not_found() {
        let e: LiveError = CoachingError::UnknownPrompt(PromptEventId::from_raw("cpe_x")).into();
        assert_eq!(e.code(), codes::NOT_FOUND);
    }
}
