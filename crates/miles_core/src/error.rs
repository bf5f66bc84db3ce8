use thiserror::Error;

use crate::id::IdError;

pub type CoachResult<T> = core::result::Result<T, CoachError>;

/// Errors surfaced by the goal/chat/profile services.
///
/// Backend failures are logged where they happen and collapsed into a
/// fixed message; the underlying cause does not travel further.
#[derive(Debug, Error)]
pub enum CoachError {
    #[error("{0}")]
    Validation(String),
    /// The request is valid but clashes with what is already stored.
    #[error("{0}")]
    Conflict(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("{0}")]
    Backend(&'static str),
    #[error(transparent)]
    Id(#[from] IdError),
}

impl CoachError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoachError::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        CoachError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        CoachError::Conflict(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoachError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(CoachError::Backend("Failed to create goal").to_string(), "Failed to create goal");
        assert_eq!(CoachError::not_found("goal", "abc").to_string(), "goal not found: abc");
        assert!(CoachError::not_found("goal", "abc").is_not_found());
    }
}
