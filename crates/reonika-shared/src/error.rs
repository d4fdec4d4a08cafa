use thiserror::Error;

/// Failure taxonomy shared by every collaborator call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReonikaError {
    /// Transient failure talking to the backend. Background work retries on
    /// the next scheduled trigger.
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// The caller is not a participant of the targeted conversation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Empty payload or otherwise malformed input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The conversation or message is already gone.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A remote call did not answer in time.
    #[error("Timed out: {0}")]
    Timeout(String),
}

/// How a failed foreground action is surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Nothing is shown; the next refresh reconciles the view.
    Silent,
    /// Shown next to the input that caused it.
    Inline(String),
    /// Modal notification, the action is aborted.
    Blocking(String),
    /// Short-lived toast.
    Transient(String),
}

impl ReonikaError {
    /// Transient errors a background task may simply retry on its next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkFailure(_) | Self::Timeout(_))
    }

    pub fn notice(&self) -> Notice {
        match self {
            Self::NotFound(_) => Notice::Silent,
            Self::Validation(msg) => Notice::Inline(msg.clone()),
            Self::PermissionDenied(msg) => Notice::Blocking(msg.clone()),
            Self::NetworkFailure(_) | Self::Timeout(_) => Notice::Transient(self.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReonikaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_mapping() {
        assert_eq!(ReonikaError::NotFound("gone".into()).notice(), Notice::Silent);
        assert_eq!(
            ReonikaError::Validation("empty".into()).notice(),
            Notice::Inline("empty".into())
        );
        assert!(matches!(
            ReonikaError::PermissionDenied("x".into()).notice(),
            Notice::Blocking(_)
        ));
        assert!(matches!(
            ReonikaError::Timeout("x".into()).notice(),
            Notice::Transient(_)
        ));
    }

    #[test]
    fn test_transient_classes() {
        assert!(ReonikaError::NetworkFailure("down".into()).is_transient());
        assert!(ReonikaError::Timeout("slow".into()).is_transient());
        assert!(!ReonikaError::PermissionDenied("no".into()).is_transient());
        assert!(!ReonikaError::NotFound("no".into()).is_transient());
    }
}
