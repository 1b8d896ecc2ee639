use std::time::Duration;

/// Typed error hierarchy for task operations.
/// Classifies errors as locally resolved (validation/precondition,
/// handled with a no-op or inline message) or reported (surfaced to
/// the user through a notice).
#[derive(Clone, Debug, thiserror::Error)]
pub enum TaskError {
    // Resolved locally
    #[error("not signed in")]
    Unauthenticated,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("missing identifier: {0}")]
    MissingId(String),

    // Reported
    #[error("store call failed: {0}")]
    Remote(String),
    #[error("live query terminated: {0}")]
    Subscription(String),
}

impl TaskError {
    /// Local errors never propagate as unhandled failures.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated | Self::Validation(_) | Self::MissingId(_)
        )
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_) | Self::Subscription(_))
    }

    /// Short classification string for logging/notices.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Validation(_) => "validation_error",
            Self::MissingId(_) => "missing_id",
            Self::Remote(_) => "remote_failure",
            Self::Subscription(_) => "subscription_error",
        }
    }
}

/// Typed failures from the auth provider's sign-in call.
#[derive(Clone, Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no account for {0}")]
    UnknownIdentity(String),
    #[error("wrong password")]
    InvalidCredential,
    #[error("malformed email: {0}")]
    InvalidEmail(String),
    #[error("too many attempts")]
    Throttled { retry_after: Option<Duration> },
    #[error("auth provider error: {0}")]
    Provider(String),
}

impl AuthError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::UnknownIdentity(_) => "unknown_identity",
            Self::InvalidCredential => "invalid_credential",
            Self::InvalidEmail(_) => "invalid_email",
            Self::Throttled { .. } => "throttled",
            Self::Provider(_) => "provider_error",
        }
    }

    /// Whether retrying with the same credentials could succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled { .. } | Self::Provider(_))
    }

    pub fn suggested_delay(&self) -> Option<Duration> {
        if let Self::Throttled { retry_after } = self {
            *retry_after
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_classification() {
        assert!(TaskError::Unauthenticated.is_local());
        assert!(TaskError::Validation("empty title".into()).is_local());
        assert!(TaskError::MissingId("task id".into()).is_local());
        assert!(!TaskError::Remote("network".into()).is_local());
    }

    #[test]
    fn remote_classification() {
        assert!(TaskError::Remote("permission denied".into()).is_remote());
        assert!(TaskError::Subscription("query dropped".into()).is_remote());
        assert!(!TaskError::Unauthenticated.is_remote());
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(TaskError::Unauthenticated.error_kind(), "unauthenticated");
        assert_eq!(TaskError::Validation("x".into()).error_kind(), "validation_error");
        assert_eq!(TaskError::MissingId("x".into()).error_kind(), "missing_id");
        assert_eq!(TaskError::Remote("x".into()).error_kind(), "remote_failure");
        assert_eq!(TaskError::Subscription("x".into()).error_kind(), "subscription_error");
    }

    #[test]
    fn auth_retryable_classification() {
        assert!(AuthError::Throttled { retry_after: None }.is_retryable());
        assert!(AuthError::Provider("down".into()).is_retryable());
        assert!(!AuthError::InvalidCredential.is_retryable());
        assert!(!AuthError::UnknownIdentity("a@b.c".into()).is_retryable());
    }

    #[test]
    fn suggested_delay_only_when_throttled() {
        let throttled = AuthError::Throttled {
            retry_after: Some(Duration::from_secs(60)),
        };
        assert_eq!(throttled.suggested_delay(), Some(Duration::from_secs(60)));
        assert_eq!(AuthError::InvalidCredential.suggested_delay(), None);
    }
}
