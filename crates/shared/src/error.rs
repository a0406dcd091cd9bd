//! Shared error types.

use serde::Deserialize;

/// API error type for client-side use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    Network(String),
    Http { status: u16, body: String },
    Deserialize(String),
}

impl ApiError {
    /// True for responses that mean the stored credential is no longer valid.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::Http { status: 401 | 403, .. })
    }

    /// Message suitable for showing to the user, falling back to `fallback`
    /// when the backend gave nothing readable.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Http { body, .. } => {
                try_error_detail(body).unwrap_or_else(|| fallback.to_string())
            }
            _ => fallback.to_string(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Network(msg) => write!(f, "Network error: {}", msg),
            ApiError::Http { status, body } => write!(f, "HTTP {}: {}", status, body),
            ApiError::Deserialize(msg) => write!(f, "Deserialization error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// Shape of the framework's default JSON error body.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Extract a user-facing message from an error response body.
///
/// The backend answers most failures with a plain-text body
/// (`"User not found"`); framework errors come back as JSON with
/// `message`/`error` fields. Prefers `message`, falls back to `error`.
pub fn try_error_detail(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('{') {
        let parsed = serde_json::from_str::<ErrorBody>(trimmed).ok()?;
        return parsed
            .message
            .filter(|m| !m.trim().is_empty())
            .or(parsed.error.filter(|e| !e.trim().is_empty()));
    }
    Some(trimmed.trim_matches('"').to_string())
}

/// Failure to decode a STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame is incomplete")]
    Incomplete,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("malformed header line: {0}")]
    MalformedHeader(String),
    #[error("invalid escape sequence in header: {0}")]
    InvalidEscape(String),
    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),
    #[error("body is not terminated by NUL")]
    MissingNul,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_body_is_used_as_is() {
        assert_eq!(
            try_error_detail("User not found").as_deref(),
            Some("User not found")
        );
    }

    #[test]
    fn json_body_prefers_message() {
        let body = r#"{"status":500,"error":"Internal Server Error","message":"Room not found!"}"#;
        assert_eq!(try_error_detail(body).as_deref(), Some("Room not found!"));
    }

    #[test]
    fn json_body_falls_back_to_error() {
        let body = r#"{"status":403,"error":"Forbidden","message":""}"#;
        assert_eq!(try_error_detail(body).as_deref(), Some("Forbidden"));
    }

    #[test]
    fn empty_body_gives_fallback() {
        let err = ApiError::Http {
            status: 500,
            body: String::new(),
        };
        assert_eq!(err.user_message("Failed to fetch rooms"), "Failed to fetch rooms");
        assert!(!err.is_auth_failure());
        assert!(ApiError::Http { status: 401, body: String::new() }.is_auth_failure());
    }
}
