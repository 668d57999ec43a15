use thiserror::Error;

use crate::api::ApiError;

/// Error returned by auth-service calls and session manager mutations.
///
/// Rejections are relayed as the service worded them; nothing here tries to
/// interpret the message.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Auth service fault: {0}")]
    Fault(String),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Session manager has been shut down")]
    ShutDown,
}

impl AuthError {
    pub fn rejected(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        AuthError::Rejected {
            status,
            code,
            message: message.into(),
        }
    }

    /// Machine readable code for rejections (`invalid_credentials`, ...)
    pub fn code(&self) -> Option<&str> {
        match self {
            AuthError::Rejected { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// True when the service refused the credentials or token itself, as
    /// opposed to being unreachable.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AuthError::Rejected { .. } | AuthError::Api(ApiError::Unauthorized) | AuthError::NotSignedIn
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_relays_message() {
        let err = AuthError::rejected(400, Some("invalid_credentials".into()), "Invalid login credentials");
        assert_eq!(err.to_string(), "Invalid login credentials");
        assert_eq!(err.code(), Some("invalid_credentials"));
        assert!(err.is_rejection());
    }

    #[test]
    fn test_unreachable_is_not_rejection() {
        let err = AuthError::Api(ApiError::ServerError("down".into()));
        assert!(!err.is_rejection());
        assert_eq!(err.code(), None);
        assert!(!AuthError::ShutDown.is_rejection());
    }
}
