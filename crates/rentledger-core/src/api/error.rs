use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error payload shapes returned by the backend.
///
/// The auth API answers with `error`/`error_description` (OAuth style) or
/// `msg`/`error_code`, the data API with `message`/`code`/`details`/`hint`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    details: Option<String>,
}

impl ErrorBody {
    pub(crate) fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }

    /// Human readable message, most specific field first
    pub(crate) fn message(&self) -> Option<String> {
        self.error_description
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.message.clone())
            .or_else(|| self.details.clone())
            .or_else(|| self.error.clone())
    }

    /// Machine readable code (`invalid_credentials`, `PGRST116`, ...)
    pub(crate) fn code(&self) -> Option<String> {
        if let Some(ref code) = self.error_code {
            return Some(code.clone());
        }
        match self.code {
            Some(serde_json::Value::String(ref s)) => Some(s.clone()),
            Some(serde_json::Value::Number(ref n)) => Some(n.to_string()),
            _ => self.error.clone(),
        }
    }
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = ErrorBody::parse(body)
            .and_then(|b| b.message())
            .unwrap_or_else(|| Self::truncate_body(body));
        match status.as_u16() {
            400 | 422 => ApiError::BadRequest(detail),
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(detail),
            404 => ApiError::NotFound(detail),
            409 => ApiError::Conflict(detail),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(detail),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, detail)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_classifies_codes() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::CONFLICT, "{}"),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream"),
            ApiError::ServerError(_)
        ));
    }

    #[test]
    fn test_from_status_prefers_json_message() {
        let body = r#"{"code":"23505","details":null,"hint":null,"message":"duplicate key value"}"#;
        match ApiError::from_status(StatusCode::CONFLICT, body) {
            ApiError::Conflict(msg) => assert_eq!(msg, "duplicate key value"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 20);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.contains("truncated"));
        assert_eq!(ApiError::truncate_body("short"), "short");
    }

    #[test]
    fn test_error_body_message_and_code() {
        let body = ErrorBody::parse(
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        )
        .expect("Failed to parse auth error body");
        assert_eq!(body.message().as_deref(), Some("Invalid login credentials"));
        assert_eq!(body.code().as_deref(), Some("invalid_grant"));

        let body = ErrorBody::parse(r#"{"code":400,"error_code":"email_not_confirmed","msg":"Email not confirmed"}"#)
            .expect("Failed to parse auth error body");
        assert_eq!(body.message().as_deref(), Some("Email not confirmed"));
        assert_eq!(body.code().as_deref(), Some("email_not_confirmed"));

        let body = ErrorBody::parse(r#"{"code":"PGRST116","message":"no rows"}"#)
            .expect("Failed to parse data error body");
        assert_eq!(body.code().as_deref(), Some("PGRST116"));
    }
}
